//! Config validation: unknown-key detection with Levenshtein suggestions
//! and value range checks.
//!
//! Two-pass parse approach: first deserialize raw TOML into `toml::Value`,
//! walk the key tree, compare against known field names, and emit warnings
//! with "did you mean?" suggestions. Then proceed with normal serde
//! deserialization. Warnings never break existing configs.

use std::collections::BTreeSet;

use super::StrategyConfig;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Every valid dotted key path for `StrategyConfig`.
///
/// Maintained by hand to match the section structs in strategy_config.rs.
pub fn known_config_keys() -> BTreeSet<&'static str> {
    [
        // [optimizer]
        "optimizer",
        "optimizer.tick_kg_ha",
        "optimizer.epsilon",
        "optimizer.max_iterations",
        "optimizer.hurdle_rate",
        // [risk]
        "risk",
        "risk.confidence_level",
        "risk.conservative_rate_fraction",
        "risk.conservative_hurdle",
        // [manager]
        "manager",
        "manager.materiality_threshold_pct",
        // [storage]
        "storage",
        "storage.backend",
        "storage.path",
        // [monte_carlo]
        "monte_carlo",
        "monte_carlo.samples",
        "monte_carlo.commodity_volatility",
        "monte_carlo.fertilizer_volatility",
        "monte_carlo.seed",
    ]
    .into_iter()
    .collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// For example, a table `{ a = { b = 1, c = 2 } }` yields:
/// `["a", "a.b", "a.c"]`
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

/// Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_chars.len()]
}

/// Closest known key within edit distance 3, first in key order on ties.
pub fn suggest_correction(unknown: &str, known: &BTreeSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|k| (*k, levenshtein(unknown, k)))
        .filter(|(_, d)| *d <= 3)
        .min_by_key(|(_, d)| *d)
        .map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// Never fails; parse errors surface later from serde.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let Ok(value) = raw_toml.parse::<toml::Value>() else {
        return Vec::new();
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Range Validation
// ============================================================================

fn check_positive(name: &str, value: f64, errors: &mut Vec<String>) {
    if !value.is_finite() || value <= 0.0 {
        errors.push(format!("{name} = {value} must be a finite number > 0"));
    }
}

/// Validate value ranges on a parsed `StrategyConfig`.
///
/// Returns (errors, warnings): errors are impossible values that must
/// prevent startup; warnings are suspicious but not fatal.
pub fn validate_physical_ranges(config: &StrategyConfig) -> (Vec<String>, Vec<ValidationWarning>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let o = &config.optimizer;
    check_positive("optimizer.tick_kg_ha", o.tick_kg_ha, &mut errors);
    check_positive("optimizer.hurdle_rate", o.hurdle_rate, &mut errors);
    if !o.epsilon.is_finite() || o.epsilon < 0.0 {
        errors.push(format!("optimizer.epsilon = {} must be >= 0", o.epsilon));
    }
    if o.max_iterations == 0 {
        errors.push("optimizer.max_iterations must be > 0".to_string());
    }
    // Coarse ticks skip past the optimum on low-rate micronutrients
    if o.tick_kg_ha.is_finite() && o.tick_kg_ha > 5.0 {
        warnings.push(ValidationWarning {
            field: "optimizer.tick_kg_ha".to_string(),
            message: format!("optimizer.tick_kg_ha = {} is coarser than typical (<= 5 kg/ha)", o.tick_kg_ha),
            suggestion: None,
        });
    }
    if o.hurdle_rate.is_finite() && o.hurdle_rate < 1.0 {
        warnings.push(ValidationWarning {
            field: "optimizer.hurdle_rate".to_string(),
            message: format!(
                "optimizer.hurdle_rate = {} accepts ticks that lose money at the margin",
                o.hurdle_rate
            ),
            suggestion: None,
        });
    }

    let r = &config.risk;
    if !(r.confidence_level > 0.0 && r.confidence_level < 1.0) {
        errors.push(format!(
            "risk.confidence_level = {} must be in (0, 1)",
            r.confidence_level
        ));
    }
    if !(r.conservative_rate_fraction > 0.0 && r.conservative_rate_fraction <= 1.0) {
        errors.push(format!(
            "risk.conservative_rate_fraction = {} must be in (0, 1]",
            r.conservative_rate_fraction
        ));
    }
    check_positive("risk.conservative_hurdle", r.conservative_hurdle, &mut errors);
    if r.conservative_hurdle.is_finite() && r.conservative_hurdle < o.hurdle_rate {
        warnings.push(ValidationWarning {
            field: "risk.conservative_hurdle".to_string(),
            message: format!(
                "risk.conservative_hurdle = {} is below optimizer.hurdle_rate = {}; the base hurdle applies",
                r.conservative_hurdle, o.hurdle_rate
            ),
            suggestion: None,
        });
    }

    let m = &config.manager;
    if !m.materiality_threshold_pct.is_finite() || m.materiality_threshold_pct < 0.0 {
        errors.push(format!(
            "manager.materiality_threshold_pct = {} must be >= 0",
            m.materiality_threshold_pct
        ));
    }

    let mc = &config.monte_carlo;
    if mc.samples == 0 {
        errors.push("monte_carlo.samples must be > 0".to_string());
    }
    for (name, vol) in [
        ("monte_carlo.commodity_volatility", mc.commodity_volatility),
        ("monte_carlo.fertilizer_volatility", mc.fertilizer_volatility),
    ] {
        if !vol.is_finite() || vol < 0.0 {
            errors.push(format!("{name} = {vol} must be >= 0"));
        } else if vol > 1.0 {
            warnings.push(ValidationWarning {
                field: name.to_string(),
                message: format!("{name} = {vol} is outside typical range (0-1)"),
                suggestion: None,
            });
        }
    }

    (errors, warnings)
}

// ============================================================================
// Tests
// ============================================================================

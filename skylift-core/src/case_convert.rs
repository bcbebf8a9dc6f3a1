//! Case conversion from composer attribute names to engine property names
//!
//! Composers use snake_case (e.g., `evaluate_target_health`); the engine's
//! AWS packages use lowerCamelCase (e.g., `evaluateTargetHealth`).

use heck::ToLowerCamelCase;

/// Convert a snake_case attribute name to a lowerCamelCase property name
///
/// Keys that are not plain identifiers (file names, header names, anything
/// with `.`, `/`, `:` or `-`) are data rather than property names and are
/// returned unchanged.
pub fn to_property_name(key: &str) -> String {
    if key.contains(['.', '/', ':', '-']) || !key.contains('_') {
        return key.to_string();
    }
    key.to_lower_camel_case()
}

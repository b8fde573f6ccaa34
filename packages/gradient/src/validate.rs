//! Pre-dispatch request validation.

use market_map_gradient_models::{CoverageProperty, GradientRequest};

use crate::GradientError;

/// Checks that `request` is complete enough to send.
///
/// All problems are reported together so a caller can fix them in one go.
///
/// # Errors
///
/// Returns [`GradientError::Validation`] listing every missing or invalid
/// field.
pub fn validate(request: &GradientRequest) -> Result<(), GradientError> {
    let mut problems = Vec::new();

    for (field, value) in [
        ("change_lyr_id", &request.change_lyr_id),
        ("based_on_lyr_id", &request.based_on_lyr_id),
        ("color_based_on", &request.color_based_on),
    ] {
        if value.trim().is_empty() {
            problems.push(format!("{field} is required"));
        }
    }

    if request.color_grid_choice.is_empty() {
        problems.push("color_grid_choice must list at least one color".to_string());
    }
    for color in &request.color_grid_choice {
        if !is_hex_color(color) {
            problems.push(format!("'{color}' in color_grid_choice is not a #RGB or #RRGGBB color"));
        }
    }

    if !request.coverage_value.is_finite() || request.coverage_value <= 0.0 {
        problems.push(format!(
            "coverage_value must be a positive number of {}, got {}",
            coverage_unit(request),
            request.coverage_value
        ));
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(GradientError::Validation {
            message: problems.join("; "),
        })
    }
}

/// `#RGB` or `#RRGGBB`.
#[must_use]
pub fn is_hex_color(color: &str) -> bool {
    color.strip_prefix('#').is_some_and(|digits| {
        matches!(digits.len(), 3 | 6) && digits.chars().all(|c| c.is_ascii_hexdigit())
    })
}

const fn coverage_unit(request: &GradientRequest) -> &'static str {
    match request.coverage_property {
        CoverageProperty::Radius => "meters",
        CoverageProperty::DriveTime => "minutes",
    }
}

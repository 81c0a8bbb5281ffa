//! # Primitives
//!
//! Fixed constants of the amilayer engine. They are compiled into the binary
//! and immutable at runtime.

/// Builder type written into every builder record.
pub const BUILDER_TYPE: &str = "amazon-ebs";

/// Directory files are uploaded to before being moved into place.
pub const STAGING_DIR: &str = "/tmp";

/// Separator used for the `AdditionalRegions` tag.
pub const REGION_SEPARATOR: &str = ",";

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum size of a definitions or state file (16 MB).
///
/// Larger inputs are rejected before parsing.
pub const MAX_INPUT_FILE_SIZE: u64 = 16 * 1024 * 1024;

/// Format the output image name for `image` at `version`.
#[must_use]
pub fn ami_name(image: &str, version: &str) -> String {
    format!("{}-{}", image, version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ami_name_joins_with_dash() {
        assert_eq!(ami_name("base", "1.3.0"), "base-1.3.0");
    }
}

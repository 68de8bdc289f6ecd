// src/recipe/parser.rs

//! Recipe file parsing

use crate::error::{Error, Result};
use crate::recipe::format::Recipe;
use std::path::Path;

/// The MPD recipe shipped with the binary
const BUNDLED_MPD_RECIPE: &str = include_str!("../../recipes/mpd.toml");

/// Patches referenced by the bundled recipe, keyed by their recipe path
const BUNDLED_PATCHES: &[(&str, &str)] = &[(
    "patches/mpd-ffmpeg-5.1-extern-c.patch",
    include_str!("../../recipes/patches/mpd-ffmpeg-5.1-extern-c.patch"),
)];

/// Parse a recipe from a TOML string
pub fn parse_recipe(content: &str) -> Result<Recipe> {
    toml::from_str(content).map_err(|e| Error::ParseError(format!("Invalid recipe: {}", e)))
}

/// Parse a recipe from a file
///
/// Local patch paths in the recipe resolve against the file's directory.
pub fn parse_recipe_file(path: &Path) -> Result<Recipe> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::IoError(format!("Failed to read recipe file: {}", e)))?;

    let mut recipe = parse_recipe(&content)?;
    recipe.base_dir = path.parent().map(Path::to_path_buf);
    Ok(recipe)
}

/// The bundled MPD recipe
pub fn bundled_recipe() -> Result<Recipe> {
    parse_recipe(BUNDLED_MPD_RECIPE)
}

/// Contents of a patch shipped with the bundled recipe
pub fn bundled_patch(file: &str) -> Option<&'static str> {
    BUNDLED_PATCHES
        .iter()
        .find(|(name, _)| *name == file)
        .map(|(_, content)| *content)
}

/// Validate a recipe for completeness and correctness
///
/// Returns warnings for optional pieces that are missing; hard errors for
/// anything the kitchen could not act on.
pub fn validate_recipe(recipe: &Recipe) -> Result<Vec<String>> {
    let mut warnings = Vec::new();

    if recipe.package.name.is_empty() {
        return Err(Error::ParseError("Recipe package name cannot be empty".to_string()));
    }
    if recipe.package.version.is_empty() {
        return Err(Error::ParseError("Recipe package version cannot be empty".to_string()));
    }

    if !recipe.source.checksum.starts_with("sha256:") {
        return Err(Error::ParseError(format!(
            "Invalid checksum format: {}. Expected sha256:...",
            recipe.source.checksum
        )));
    }

    // Options must parse; the plan is built from them later
    recipe.build.feature_flags()?;

    for dep in &recipe.dependencies {
        if dep.name.is_empty() {
            return Err(Error::ParseError("Dependency name cannot be empty".to_string()));
        }
    }

    for ov in &recipe.platform {
        for define in &ov.defines {
            if define.contains(char::is_whitespace) {
                return Err(Error::ParseError(format!(
                    "Platform define must not contain whitespace: {}",
                    define
                )));
            }
        }
    }

    if let Some(service) = &recipe.service
        && service.run.is_empty()
    {
        return Err(Error::ParseError("Service run command cannot be empty".to_string()));
    }

    if let Some(test) = &recipe.test {
        if test.timeout_secs == 0 {
            return Err(Error::ParseError("Test timeout must be positive".to_string()));
        }
        if test.greeting.is_empty() || test.ack.is_empty() || test.command.is_empty() {
            return Err(Error::ParseError(
                "Test greeting, command and ack must be set".to_string(),
            ));
        }
    } else {
        warnings.push("No smoke test defined".to_string());
    }

    if recipe.install.config_template.is_some() != recipe.install.config_name.is_some() {
        return Err(Error::ParseError(
            "install.config_template and install.config_name must be set together".to_string(),
        ));
    }

    if recipe.package.summary.is_none() {
        warnings.push("Missing package summary".to_string());
    }
    if recipe.package.license.is_none() {
        warnings.push("Missing package license".to_string());
    }
    if recipe.install.binaries.is_empty() {
        warnings.push("No binaries listed under [install]".to_string());
    }
    if recipe.livecheck.is_none() {
        warnings.push("No livecheck defined".to_string());
    }

    Ok(warnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[package]
name = "test"
version = "1.0"

[source]
archive = "https://example.com/test-1.0.tar.gz"
checksum = "sha256:abc123"

[build]
"#;

    #[test]
    fn test_parse_valid_recipe() {
        let recipe = parse_recipe(MINIMAL).unwrap();
        assert_eq!(recipe.package.name, "test");
        assert!(recipe.base_dir.is_none());
    }

    #[test]
    fn test_parse_invalid_recipe() {
        let content = "this is not valid toml at all {}";
        assert!(parse_recipe(content).is_err());
    }

    #[test]
    fn test_parse_recipe_file_sets_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.toml");
        std::fs::write(&path, MINIMAL).unwrap();

        let recipe = parse_recipe_file(&path).unwrap();
        assert_eq!(recipe.base_dir.as_deref(), Some(dir.path()));
    }

    #[test]
    fn test_validate_empty_name() {
        let content = MINIMAL.replace("name = \"test\"", "name = \"\"");
        let recipe = parse_recipe(&content).unwrap();
        assert!(validate_recipe(&recipe).is_err());
    }

    #[test]
    fn test_validate_bad_checksum() {
        let content = MINIMAL.replace("sha256:abc123", "md5:abc123");
        let recipe = parse_recipe(&content).unwrap();
        assert!(validate_recipe(&recipe).is_err());
    }

    #[test]
    fn test_validate_bad_option() {
        let content = MINIMAL.replace("[build]", "[build]\noptions = [\"broken\"]");
        let recipe = parse_recipe(&content).unwrap();
        assert!(validate_recipe(&recipe).is_err());
    }

    #[test]
    fn test_validate_warnings() {
        let recipe = parse_recipe(MINIMAL).unwrap();
        let warnings = validate_recipe(&recipe).unwrap();
        assert!(warnings.iter().any(|w| w.contains("summary")));
        assert!(warnings.iter().any(|w| w.contains("license")));
        assert!(warnings.iter().any(|w| w.contains("smoke test")));
    }

    #[test]
    fn test_bundled_recipe_is_valid() {
        let recipe = bundled_recipe().unwrap();
        assert_eq!(recipe.package.name, "mpd");
        assert_eq!(recipe.full_version(), "0.23.8_1");
        assert_eq!(recipe.build.build_dir, "output/release");
        assert_eq!(recipe.build.options.len(), 12);
        assert!(recipe.build.deparallelize_install);

        let warnings = validate_recipe(&recipe).unwrap();
        assert!(warnings.is_empty(), "unexpected warnings: {:?}", warnings);

        let test = recipe.test.as_ref().unwrap();
        assert_eq!(test.greeting, "OK MPD");
        assert_eq!(test.command, "ping");
        assert_eq!(test.ack, "OK");
        assert_eq!(test.timeout_secs, 30);
        assert!(recipe.caveats.as_deref().unwrap().contains("%(etc)s/mpd/mpd.conf"));
    }

    #[test]
    fn test_bundled_patches_resolve() {
        let recipe = bundled_recipe().unwrap();
        for patch in &recipe.patches.as_ref().unwrap().files {
            let content = bundled_patch(&patch.file).unwrap();
            assert!(content.contains("extern \"C\""));
        }
        assert!(bundled_patch("patches/unknown.patch").is_none());
    }
}

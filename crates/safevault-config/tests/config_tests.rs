// SPDX-FileCopyrightText: 2026 SafeVault Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the SafeVault configuration system.

use safevault_config::diagnostic::{suggest_key, ConfigError};
use safevault_config::model::{SafevaultConfig, StorageBackendKind};
use safevault_config::{load_and_validate_path, load_and_validate_str, load_config_from_str};

/// Valid TOML with all known fields deserializes successfully.
#[test]
fn valid_toml_deserializes_into_safevault_config() {
    let toml = r#"
[vault]
kdf_memory_cost = 131072
kdf_iterations = 4
kdf_parallelism = 2
idle_timeout_secs = 120
unlock_timeout_secs = 30

[storage]
backend = "sqlite"
path = "/tmp/safevault"
slot = "personal"

[log]
level = "debug"
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.vault.kdf_memory_cost, 131072);
    assert_eq!(config.vault.kdf_iterations, 4);
    assert_eq!(config.vault.kdf_parallelism, 2);
    assert_eq!(config.vault.idle_timeout_secs, 120);
    assert_eq!(config.vault.unlock_timeout_secs, Some(30));
    assert_eq!(config.storage.backend, StorageBackendKind::Sqlite);
    assert_eq!(config.storage.path, "/tmp/safevault");
    assert_eq!(config.storage.slot, "personal");
    assert_eq!(config.log.level, "debug");
}

/// Unknown field in [vault] section produces an UnknownField error.
#[test]
fn unknown_field_in_vault_produces_error() {
    let toml = r#"
[vault]
kdf_iteratons = 4
"#;

    let err = load_config_from_str(toml).expect_err("should reject unknown field");
    let err_str = format!("{err}");
    // Figment wraps serde's deny_unknown_fields error
    assert!(
        err_str.contains("unknown field") || err_str.contains("kdf_iteratons"),
        "error should mention unknown field or the bad key, got: {err_str}"
    );
}

/// Missing optional sections use defaults without error.
#[test]
fn missing_optional_sections_use_defaults() {
    let config = load_config_from_str("").expect("empty TOML should use defaults");

    assert_eq!(config.vault.kdf_memory_cost, 65536);
    assert_eq!(config.vault.kdf_iterations, 3);
    assert_eq!(config.vault.kdf_parallelism, 4);
    assert_eq!(config.storage.backend, StorageBackendKind::File);
    assert_eq!(config.storage.slot, "vault");
    assert!(!config.storage.path.is_empty());
    assert_eq!(config.log.level, "warn");
}

/// Dotted keys override TOML, which is what the env provider produces.
#[test]
fn dotted_override_beats_toml() {
    use figment::{
        providers::{Format, Serialized, Toml},
        Figment,
    };

    let config: SafevaultConfig = Figment::new()
        .merge(Serialized::defaults(SafevaultConfig::default()))
        .merge(Toml::string("[vault]\nkdf_iterations = 4\n"))
        .merge(("vault.kdf_iterations", 7))
        .extract()
        .expect("should merge override");

    assert_eq!(config.vault.kdf_iterations, 7);
}

/// Missing config files are silently skipped (Figment's Toml::file() behavior).
#[test]
fn missing_config_files_silently_skipped() {
    use figment::{
        providers::{Format, Serialized, Toml},
        Figment,
    };

    let config: SafevaultConfig = Figment::new()
        .merge(Serialized::defaults(SafevaultConfig::default()))
        .merge(Toml::file("/nonexistent/path/safevault.toml"))
        .extract()
        .expect("missing file should be silently skipped");

    assert_eq!(config.storage.slot, "vault");
}

/// The cosmetic "secure mode" toggle has no configuration counterpart.
#[test]
fn deny_unknown_fields_at_top_level() {
    let toml = r#"
[ui]
secure_mode = true
"#;

    let err = load_config_from_str(toml).expect_err("unknown top-level section should be rejected");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("unknown field") || err_str.contains("ui"),
        "error should mention unknown field, got: {err_str}"
    );
}

// ============================================================================
// Diagnostic tests
// ============================================================================

#[test]
fn diagnostic_slto_suggests_slot() {
    let valid_keys = &["backend", "path", "slot"];
    assert_eq!(suggest_key("slto", valid_keys), Some("slot".to_string()));
}

/// Error output from load_and_validate_str includes the unknown key name and a suggestion.
#[test]
fn diagnostic_error_includes_unknown_key() {
    let toml = r#"
[storage]
backnd = "file"
"#;

    let errors = load_and_validate_str(toml).expect_err("should produce errors");
    assert!(!errors.is_empty(), "should have at least one error");

    let has_unknown_key = errors.iter().any(|e| {
        matches!(e, ConfigError::UnknownKey { section, key, suggestion, valid_keys, .. } if {
            section == "storage"
                && key == "backnd"
                && suggestion.as_deref() == Some("backend")
                && valid_keys.contains("slot")
        })
    });
    assert!(
        has_unknown_key,
        "should have UnknownKey error for 'backnd' with suggestion 'backend', got: {errors:?}"
    );
}

/// The offending key is underlined in the inline source.
#[test]
fn diagnostic_unknown_key_carries_span() {
    let toml = "[storage]\nbackend = \"file\"\nslto = \"work\"\n";
    let errors = load_and_validate_str(toml).expect_err("should produce errors");
    let span = errors
        .iter()
        .find_map(|e| match e {
            ConfigError::UnknownKey { key, span, .. } if key == "slto" => *span,
            _ => None,
        })
        .expect("unknown key should carry a span");
    assert_eq!(&toml[span.offset()..span.offset() + span.len()], "slto");
}

/// A real key under the wrong section is pointed at its home section.
#[test]
fn diagnostic_misplaced_key_names_home_section() {
    let toml = "[vault]\nbackend = \"sqlite\"\n";
    let errors = load_and_validate_str(toml).expect_err("should produce errors");
    assert!(
        errors.iter().any(|e| matches!(
            e,
            ConfigError::MisplacedKey { key, belongs_in, .. } if key == "backend" && *belongs_in == "storage"
        )),
        "got: {errors:?}"
    );
}

/// An unknown top-level table is reported as a section with a suggestion.
#[test]
fn diagnostic_unknown_section_suggests_known_one() {
    let errors = load_and_validate_str("[valut]\nkdf_iterations = 4\n").expect_err("should fail");
    assert!(
        errors.iter().any(|e| matches!(
            e,
            ConfigError::UnknownSection { section, suggestion, .. }
                if section == "valut" && suggestion.as_deref() == Some("vault")
        )),
        "got: {errors:?}"
    );
}

/// An unsupported backend lists the supported ones.
#[test]
fn diagnostic_unsupported_backend_lists_choices() {
    let errors = load_and_validate_str("[storage]\nbackend = \"redis\"\n").expect_err("should fail");
    assert!(
        errors.iter().any(|e| matches!(
            e,
            ConfigError::InvalidValue { detail, expected, .. }
                if detail.contains("redis") && expected.contains("sqlite")
        )),
        "got: {errors:?}"
    );
}

/// Invalid type (string where number expected) produces clear message.
#[test]
fn diagnostic_invalid_type_message() {
    let toml = r#"
[vault]
kdf_iterations = "many"
"#;

    let err = load_config_from_str(toml).expect_err("should reject invalid type");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("invalid type") || err_str.contains("kdf_iterations"),
        "error should mention type mismatch, got: {err_str}"
    );
}

/// ConfigError implements miette::Diagnostic (can be rendered).
#[test]
fn config_error_renders_with_miette() {
    use miette::{Diagnostic, GraphicalReportHandler};

    let error = ConfigError::UnknownKey {
        section: "storage".to_string(),
        key: "backnd".to_string(),
        suggestion: Some("backend".to_string()),
        valid_keys: "backend, path, slot".to_string(),
        span: None,
        src: None,
    };

    assert!(error.code().is_some(), "should have diagnostic code");
    let help = error.help().expect("should have help text").to_string();
    assert!(help.contains("did you mean `backend`"), "got: {help}");

    let handler = GraphicalReportHandler::new();
    let mut buf = String::new();
    handler
        .render_report(&mut buf, &error)
        .expect("should render without error");
    assert!(buf.contains("backnd"), "rendered report should mention the key");
}

#[test]
fn load_and_validate_defaults() {
    let config = load_and_validate_str("").expect("defaults should validate");
    assert_eq!(config.vault.kdf_iterations, 3);
}

/// Validation runs after a successful parse and catches weak KDF settings.
#[test]
fn validation_catches_weak_kdf() {
    let toml = r#"
[vault]
kdf_memory_cost = 64
"#;

    let errors = load_and_validate_str(toml).expect_err("weak KDF should fail");
    let has_validation_error = errors.iter().any(|e| {
        matches!(e, ConfigError::Validation { message } if message.contains("kdf_memory_cost"))
    });
    assert!(has_validation_error, "should have validation error for memory cost");
}

/// An explicit config file is read and validated.
#[test]
fn explicit_path_is_loaded_and_validated() {
    figment::Jail::expect_with(|jail| {
        jail.create_file("custom.toml", "[storage]\nslot = \"work\"\n")?;
        let config = load_and_validate_path(std::path::Path::new("custom.toml"))
            .expect("custom file should validate");
        assert_eq!(config.storage.slot, "work");

        jail.create_file("bad.toml", "[storage]\nslot = \"a/b\"\n")?;
        let errors = load_and_validate_path(std::path::Path::new("bad.toml"))
            .expect_err("slot with separator should fail");
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("storage.slot"))));
        Ok(())
    });
}

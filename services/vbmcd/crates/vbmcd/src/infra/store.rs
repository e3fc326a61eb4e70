//! Filesystem implementation of the `ConfigStore` port.
//!
//! Layout: `<root>/<name>/config`, an INI document holding a `[default]`
//! section with the common fields plus one section named after the backend
//! type (`[hypervisor]` or `[bare-metal]`). Writes are atomic (temp file then
//! rename) and the file is private to the owner.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::warn;
use vbmc_common::{
    BackendSpec, BackendType, BareMetalSpec, BmcConfig, BmcError, BmcResult, HypervisorSpec,
    SaslCredentials, validate_name,
};

use crate::application::ports::ConfigStore;
use crate::infra::ini::{Ini, Section};

const CONFIG_FILE: &str = "config";
const DEFAULT_SECTION: &str = "default";

/// Config store rooted at a directory, one subdirectory per instance.
pub struct IniConfigStore {
    root: PathBuf,
}

impl IniConfigStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn instance_dir(&self, name: &str) -> BmcResult<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }

    /// Directory of a record that is expected to exist. A name that could
    /// never have been stored is reported as not found.
    fn existing_dir(&self, name: &str) -> BmcResult<PathBuf> {
        self.instance_dir(name).map_err(|e| match e {
            BmcError::Validation(_) => BmcError::not_found(name),
            other => other,
        })
    }

    fn write_atomic(path: &Path, content: &str) -> BmcResult<()> {
        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(0o600))?;
        }

        std::fs::rename(&temp_path, path)?;
        Ok(())
    }
}

/// Render a config as an INI document.
pub fn encode(config: &BmcConfig) -> BmcResult<String> {
    let mut ini = Ini::default();
    let default = ini.section_mut(DEFAULT_SECTION);
    for (key, value) in config.common_fields() {
        default.set(key, &checked(&config.name, key, &value)?);
    }
    let backend = ini.section_mut(config.backend_type().as_str());
    for (key, value) in config.backend.fields() {
        backend.set(key, &checked(&config.name, key, &value)?);
    }
    Ok(ini.render())
}

/// Values are single-line and trimmed on read; refuse anything that would
/// not survive.
fn checked(name: &str, key: &str, value: &str) -> BmcResult<String> {
    if value.contains(['\n', '\r']) || value.trim() != value {
        return Err(BmcError::Validation(format!(
            "value of '{key}' for '{name}' must be a single line without surrounding whitespace"
        )));
    }
    Ok(value.to_string())
}

/// Parse an INI document into a config for instance `name`.
pub fn decode(name: &str, text: &str) -> BmcResult<BmcConfig> {
    let invalid = |reason: String| BmcError::InvalidConfig {
        name: name.to_string(),
        reason,
    };
    let ini = Ini::parse(text).map_err(|e| invalid(e.to_string()))?;
    let default = ini
        .section(DEFAULT_SECTION)
        .ok_or_else(|| invalid(format!("missing [{DEFAULT_SECTION}] section")))?;
    let required = |section: &Section, key: &str| -> BmcResult<String> {
        match section.get(key) {
            Some(v) if !v.is_empty() => Ok(v.to_string()),
            _ => Err(invalid(format!("missing required field '{key}'"))),
        }
    };

    let stored_name = required(default, "name")?;
    if stored_name != name {
        return Err(invalid(format!("record names instance '{stored_name}'")));
    }
    let backend_type: BackendType = required(default, "backend_type")?
        .parse()
        .map_err(|e: BmcError| invalid(e.to_string()))?;
    let enabled = match default.get("enabled").unwrap_or("false") {
        "true" | "True" | "1" | "yes" => true,
        "false" | "False" | "0" | "no" | "" => false,
        other => return Err(invalid(format!("bad boolean for 'enabled': {other}"))),
    };
    let port = required(default, "port")?
        .parse::<u16>()
        .ok()
        .filter(|p| *p != 0)
        .ok_or_else(|| invalid("port must be between 1 and 65535".into()))?;

    let section = ini
        .section(backend_type.as_str())
        .ok_or_else(|| invalid(format!("missing [{backend_type}] section")))?;
    let optional = |key: &str| section.get(key).filter(|v| !v.is_empty()).map(str::to_string);

    let backend = match backend_type {
        BackendType::Hypervisor => {
            let sasl = match (optional("sasl_username"), optional("sasl_password")) {
                (Some(username), Some(password)) => Some(SaslCredentials { username, password }),
                (None, None) => None,
                _ => return Err(invalid("SASL username and password must be set together".into())),
            };
            BackendSpec::Hypervisor(HypervisorSpec {
                uri: required(section, "uri")?,
                domain_name: required(section, "domain_name")?,
                sasl,
            })
        }
        BackendType::BareMetal => BackendSpec::BareMetal(BareMetalSpec {
            node_id: required(section, "node_id")?,
            cloud: required(section, "cloud")?,
            region: required(section, "region")?,
        }),
    };

    Ok(BmcConfig {
        name: stored_name,
        enabled,
        host_address: required(default, "host_address")?,
        port,
        username: required(default, "username")?,
        password: default.get("password").unwrap_or_default().to_string(),
        backend,
    })
}

impl ConfigStore for IniConfigStore {
    fn exists(&self, name: &str) -> bool {
        self.load(name).is_ok()
    }

    fn create(&self, config: BmcConfig) -> BmcResult<BmcConfig> {
        let dir = self.instance_dir(&config.name)?;
        let content = encode(&config)?;
        if dir.join(CONFIG_FILE).exists() {
            return Err(BmcError::AlreadyExists { name: config.name });
        }
        std::fs::create_dir_all(&dir)?;
        Self::write_atomic(&dir.join(CONFIG_FILE), &content)?;
        Ok(config)
    }

    fn load(&self, name: &str) -> BmcResult<BmcConfig> {
        let path = self.existing_dir(name)?.join(CONFIG_FILE);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(BmcError::not_found(name)),
            Err(e) => return Err(e.into()),
        };
        decode(name, &text)
    }

    fn save(&self, config: &BmcConfig) -> BmcResult<()> {
        let dir = self.existing_dir(&config.name)?;
        if !dir.is_dir() {
            return Err(BmcError::not_found(&config.name));
        }
        Self::write_atomic(&dir.join(CONFIG_FILE), &encode(config)?)
    }

    fn delete(&self, name: &str) -> BmcResult<()> {
        let dir = self.existing_dir(name)?;
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(BmcError::not_found(name)),
            Err(e) => Err(e.into()),
        }
    }

    fn list_names(&self) -> BmcResult<Vec<String>> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut names = Vec::new();
        for entry in entries.flatten() {
            if !entry.path().is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            match self.load(&name) {
                Ok(_) => names.push(name),
                Err(e) => warn!(name = %name, error = %e, "skipping malformed BMC config"),
            }
        }
        names.sort();
        Ok(names)
    }
}

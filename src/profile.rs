//! Saved connection profiles: `<dir>/<name>.profile`, one `key=value` per
//! line. Blank lines and `#` comments are ignored. Passwords are never stored.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::ProfileError;
use crate::render::OutputFormat;

const EXTENSION: &str = "profile";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    pub host: Option<String>,
    pub user: Option<String>,
    pub os: Option<String>,
    pub key: Option<String>,
    pub domain: Option<String>,
    pub output: Option<OutputFormat>,
    pub services: Vec<String>,
}

impl Profile {
    pub fn parse(content: &str) -> Self {
        let mut profile = Profile::default();

        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                warn!(line = lineno + 1, "ignoring profile line without '='");
                continue;
            };
            let value = value.trim();
            let text = (!value.is_empty()).then(|| value.to_string());

            match key.trim().to_ascii_lowercase().as_str() {
                "host" => profile.host = text,
                "user" => profile.user = text,
                "os" => profile.os = text,
                "key" => profile.key = text,
                "domain" => profile.domain = text,
                "output" => match value.parse() {
                    Ok(format) => profile.output = Some(format),
                    Err(e) => warn!(error = %e, "ignoring profile output setting"),
                },
                "services" => {
                    profile.services = value
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                }
                "password" => warn!("ignoring password stored in profile"),
                other => debug!(key = other, "ignoring unknown profile key"),
            }
        }
        profile
    }

    pub fn to_file_string(&self) -> String {
        let mut out = String::new();
        let fields = [
            ("host", self.host.as_deref()),
            ("user", self.user.as_deref()),
            ("os", self.os.as_deref()),
            ("key", self.key.as_deref()),
            ("domain", self.domain.as_deref()),
            ("output", self.output.map(OutputFormat::as_str)),
        ];
        for (key, value) in fields {
            if let Some(value) = value {
                let _ = writeln!(out, "{key}={value}");
            }
        }
        if !self.services.is_empty() {
            let _ = writeln!(out, "services={}", self.services.join(","));
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct ProfileStore {
    dir: PathBuf,
}

impl ProfileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, name: &str) -> Result<PathBuf, ProfileError> {
        validate_name(name)?;
        Ok(self.dir.join(format!("{name}.{EXTENSION}")))
    }

    pub fn load(&self, name: &str) -> Result<Profile, ProfileError> {
        let path = self.path(name)?;
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Profile::parse(&content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ProfileError::NotFound {
                name: name.to_string(),
                path,
            }),
            Err(source) => Err(ProfileError::Io { path, source }),
        }
    }

    pub fn save(&self, name: &str, profile: &Profile) -> Result<PathBuf, ProfileError> {
        let path = self.path(name)?;
        std::fs::create_dir_all(&self.dir).map_err(|source| ProfileError::Io {
            path: self.dir.clone(),
            source,
        })?;
        std::fs::write(&path, profile.to_file_string()).map_err(|source| ProfileError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    /// Profile names, sorted. A missing directory is an empty list.
    pub fn list(&self) -> Result<Vec<String>, ProfileError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(ProfileError::Io {
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == EXTENSION))
            .filter_map(|path| path.file_stem()?.to_str().map(String::from))
            .filter(|name| validate_name(name).is_ok())
            .collect();
        names.sort();
        Ok(names)
    }

    pub fn delete(&self, name: &str) -> Result<PathBuf, ProfileError> {
        let path = self.path(name)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ProfileError::NotFound {
                name: name.to_string(),
                path,
            }),
            Err(source) => Err(ProfileError::Io { path, source }),
        }
    }
}

fn validate_name(name: &str) -> Result<(), ProfileError> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(ProfileError::InvalidName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comments_and_services() {
        let profile = Profile::parse(
            "# This is a comment\nhost=acme.com\nuser=root\n# another\nservices=httpd, sshd\n",
        );
        assert_eq!(profile.host.as_deref(), Some("acme.com"));
        assert_eq!(profile.user.as_deref(), Some("root"));
        assert_eq!(profile.services, ["httpd", "sshd"]);
        assert_eq!(profile.os, None);
    }

    #[test]
    fn keys_are_case_insensitive_and_passwords_dropped() {
        let profile = Profile::parse("Host=a\nServices=*sql*\npassword=hunter2\nOUTPUT=json\n");
        assert_eq!(profile.host.as_deref(), Some("a"));
        assert_eq!(profile.services, ["*sql*"]);
        assert_eq!(profile.output, Some(OutputFormat::Json));
        assert!(!profile.to_file_string().contains("hunter2"));
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::new(dir.path().join("profiles"));
        let profile = Profile {
            host: Some("acme.com".into()),
            user: Some("root".into()),
            os: Some("ubuntu".into()),
            services: vec!["httpd".into(), "sshd".into()],
            ..Profile::default()
        };

        let path = store.save("testprofile", &profile).unwrap();
        assert!(path.ends_with("testprofile.profile"));
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains("password="));
        assert_eq!(store.load("testprofile").unwrap(), profile);
    }

    #[test]
    fn missing_profile_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::new(dir.path());
        assert!(matches!(
            store.load("nonexistent"),
            Err(ProfileError::NotFound { .. })
        ));
        assert!(matches!(
            store.delete("nonexistent"),
            Err(ProfileError::NotFound { .. })
        ));
    }

    #[test]
    fn list_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::new(dir.path());
        store.save("web", &Profile::default()).unwrap();
        store.save("db-01", &Profile::default()).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

        assert_eq!(store.list().unwrap(), ["db-01", "web"]);
        store.delete("web").unwrap();
        assert_eq!(store.list().unwrap(), ["db-01"]);
    }

    #[test]
    fn list_of_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::new(dir.path().join("nope"));
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn rejects_path_like_names() {
        let store = ProfileStore::new("/tmp");
        for bad in ["", "../etc", "a/b", "a.b", "x y"] {
            assert!(matches!(store.path(bad), Err(ProfileError::InvalidName(_))), "{bad:?}");
        }
    }
}

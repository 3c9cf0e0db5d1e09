use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::dicom::METADATA_FIELD_NAMES;
use crate::viewer::NavigationViewPolicy;

const APP_DIR: &str = "dicomscope";
const SETTINGS_FILE: &str = "settings.toml";

/// User preferences kept between sessions in `settings.toml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub visible_metadata_fields: HashSet<String>,
    pub navigation_view: NavigationViewPolicy,
    pub last_directory: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            visible_metadata_fields: default_visible_metadata_fields(),
            navigation_view: NavigationViewPolicy::default(),
            last_directory: None,
        }
    }
}

impl Settings {
    /// Reads the settings file, falling back to defaults for anything missing or
    /// malformed.
    pub fn load() -> Self {
        match settings_file_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) => {
                if err.kind() != std::io::ErrorKind::NotFound {
                    log::warn!("Could not read settings {}: {err}", path.display());
                }
                return Self::default();
            }
        };
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Self {
        let mut settings = Self::default();

        if let Some(parsed) = parse_string_array(text, "visible_metadata_fields") {
            let filtered = parsed
                .iter()
                .filter(|field| METADATA_FIELD_NAMES.contains(&field.as_str()))
                .cloned()
                .collect::<HashSet<_>>();
            // A list made only of unknown names is treated as corrupt.
            if parsed.is_empty() || !filtered.is_empty() {
                settings.visible_metadata_fields = filtered;
            }
        }

        if let Some(value) = parse_string_value(text, "navigation_view") {
            match NavigationViewPolicy::parse(&value) {
                Some(policy) => settings.navigation_view = policy,
                None => log::warn!("Ignoring unknown navigation_view setting {value:?}"),
            }
        }

        settings.last_directory = parse_string_value(text, "last_directory")
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        settings
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Could not create settings directory {}", parent.display())
            })?;
        }
        fs::write(path, self.render())
            .with_context(|| format!("Could not write settings {}", path.display()))
    }

    pub fn render(&self) -> String {
        let mut text = String::from("visible_metadata_fields = [\n");
        for field in ordered_visible_metadata_fields(&self.visible_metadata_fields) {
            text.push_str("  \"");
            text.push_str(&escape_toml_string(&field));
            text.push_str("\",\n");
        }
        text.push_str("]\n");
        text.push_str(&format!(
            "navigation_view = \"{}\"\n",
            self.navigation_view.as_str()
        ));
        if let Some(dir) = &self.last_directory {
            text.push_str(&format!(
                "last_directory = \"{}\"\n",
                escape_toml_string(&dir.to_string_lossy())
            ));
        }
        text
    }
}

pub fn default_visible_metadata_fields() -> HashSet<String> {
    METADATA_FIELD_NAMES
        .iter()
        .map(|field| (*field).to_string())
        .collect()
}

fn ordered_visible_metadata_fields(visible: &HashSet<String>) -> Vec<String> {
    METADATA_FIELD_NAMES
        .iter()
        .filter(|field| visible.contains(**field))
        .map(|field| (*field).to_string())
        .collect()
}

pub fn settings_file_path() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        return env::var_os("APPDATA")
            .map(PathBuf::from)
            .map(|base| base.join(APP_DIR).join(SETTINGS_FILE));
    }

    #[cfg(target_os = "macos")]
    {
        return env::var_os("HOME").map(PathBuf::from).map(|home| {
            home.join("Library")
                .join("Application Support")
                .join(APP_DIR)
                .join(SETTINGS_FILE)
        });
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        if let Some(xdg) = env::var_os("XDG_CONFIG_HOME") {
            return Some(PathBuf::from(xdg).join(APP_DIR).join(SETTINGS_FILE));
        }
        env::var_os("HOME")
            .map(PathBuf::from)
            .map(|home| home.join(".config").join(APP_DIR).join(SETTINGS_FILE))
    }
}

/// Finds `key` at the start of a line and returns the text after its `=`.
fn value_after_key<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if let Some(rest) = trimmed.strip_prefix(key) {
            let rest = rest.trim_start();
            if let Some(value) = rest.strip_prefix('=') {
                let value_start = offset + (line.len() - value.len());
                return Some(&text[value_start..]);
            }
        }
        offset += line.len();
    }
    None
}

fn parse_string_array(text: &str, key: &str) -> Option<Vec<String>> {
    let after_key = value_after_key(text, key)?;
    let open_bracket = after_key.find('[')?;
    let array_tail = &after_key[open_bracket + 1..];
    let close_bracket = array_tail.find(']')?;
    let array_body = &array_tail[..close_bracket];

    let mut values = Vec::new();
    for chunk in array_body.split(',') {
        let token = chunk.trim();
        if token.is_empty() {
            continue;
        }
        if token.starts_with('\"') && token.ends_with('\"') && token.len() >= 2 {
            let inner = &token[1..token.len() - 1];
            values.push(unescape_toml_string(inner));
        }
    }
    Some(values)
}

fn parse_string_value(text: &str, key: &str) -> Option<String> {
    let after_key = value_after_key(text, key)?;
    let line = after_key.lines().next()?.trim();
    let inner = line.strip_prefix('\"')?;

    // Closing quote is the first one not preceded by an escape.
    let mut escaped = false;
    for (position, ch) in inner.char_indices() {
        match ch {
            '\\' if !escaped => escaped = true,
            '\"' if !escaped => return Some(unescape_toml_string(&inner[..position])),
            _ => escaped = false,
        }
    }
    None
}

fn escape_toml_string(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\"', "\\\"")
}

fn unescape_toml_string(value: &str) -> String {
    let mut output = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            output.push(ch);
            continue;
        }
        let Some(next) = chars.next() else {
            break;
        };
        match next {
            '\\' => output.push('\\'),
            '\"' => output.push('\"'),
            'n' => output.push('\n'),
            'r' => output.push('\r'),
            't' => output.push('\t'),
            other => output.push(other),
        }
    }
    output
}

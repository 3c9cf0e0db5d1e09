use std::path::PathBuf;

use clap::Parser;

use crate::presets::Preset;

const URI_SCHEME: &str = "dicomscope://";

/// Browse a folder of DICOM images with window/level, zoom and pan.
#[derive(Debug, Clone, Default, Parser)]
#[command(version)]
pub struct Cli {
    /// Directory to open, or a dicomscope://open?dir=... link
    pub target: Option<String>,

    /// Window/level preset to apply once the first image is shown (e.g. "Bone")
    #[arg(long, value_name = "NAME")]
    pub preset: Option<String>,

    /// Zero-based index of the image to open first
    #[arg(long, value_name = "N")]
    pub index: Option<usize>,

    /// Keep window, zoom and pan when moving between images
    #[arg(long)]
    pub keep_view: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub directory: PathBuf,
    pub preset: Option<Preset>,
    pub start_index: Option<usize>,
}

/// Turns the command line into an initial request. `Ok(None)` means nothing
/// was asked for. Flags given next to a URI take precedence over its query.
pub fn resolve_launch_request(cli: &Cli) -> Result<Option<LaunchRequest>, String> {
    let Some(target) = cli.target.as_deref().map(str::trim).filter(|t| !t.is_empty()) else {
        if cli.preset.is_some() || cli.index.is_some() {
            return Err("--preset and --index need a directory to open.".to_string());
        }
        return Ok(None);
    };

    let mut request = if is_dicomscope_uri(target) {
        parse_dicomscope_uri(target)?
    } else {
        LaunchRequest {
            directory: PathBuf::from(target),
            preset: None,
            start_index: None,
        }
    };

    if let Some(name) = cli.preset.as_deref() {
        request.preset = Some(parse_preset(name)?);
    }
    if cli.index.is_some() {
        request.start_index = cli.index;
    }
    Ok(Some(request))
}

pub fn parse_dicomscope_uri(uri: &str) -> Result<LaunchRequest, String> {
    let rest = strip_dicomscope_scheme(uri)
        .ok_or_else(|| format!("URL must start with {URI_SCHEME}"))?;

    let (location, query) = split_location_and_query(rest);
    let mut directory = parse_location_path(location)?;
    let mut preset = None::<Preset>;
    let mut start_index = None::<usize>;

    if let Some(query_string) = query {
        for pair in query_string.split('&') {
            if pair.is_empty() {
                continue;
            }
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = key.trim().to_ascii_lowercase();
            let decoded_value = percent_decode(value)?;
            let trimmed = decoded_value.trim();
            match key.as_str() {
                "dir" | "directory" | "path" | "folder" => {
                    if !trimmed.is_empty() {
                        directory = Some(decoded_value.clone());
                    }
                }
                "preset" | "window" => {
                    if !trimmed.is_empty() {
                        preset = Some(parse_preset(trimmed)?);
                    }
                }
                "index" | "slice" => {
                    if trimmed.is_empty() {
                        continue;
                    }
                    let parsed = trimmed
                        .parse::<usize>()
                        .map_err(|_| "index must be a non-negative integer.".to_string())?;
                    start_index = Some(parsed);
                }
                _ => log::debug!("Ignoring unknown launch parameter {key:?}"),
            }
        }
    }

    let Some(directory) = directory else {
        return Err("No directory found in URL. Use dir=... or path=...".to_string());
    };

    Ok(LaunchRequest {
        directory: PathBuf::from(directory),
        preset,
        start_index,
    })
}

fn parse_preset(name: &str) -> Result<Preset, String> {
    Preset::from_name(name).ok_or_else(|| format!("Unknown preset {name:?}."))
}

fn is_dicomscope_uri(value: &str) -> bool {
    strip_dicomscope_scheme(value).is_some()
}

fn strip_dicomscope_scheme(uri: &str) -> Option<&str> {
    uri.get(..URI_SCHEME.len())
        .filter(|prefix| prefix.eq_ignore_ascii_case(URI_SCHEME))
        .map(|_| &uri[URI_SCHEME.len()..])
}

fn split_location_and_query(value: &str) -> (&str, Option<&str>) {
    if let Some((location, query)) = value.split_once('?') {
        (location, Some(query))
    } else {
        (value, None)
    }
}

fn parse_location_path(location: &str) -> Result<Option<String>, String> {
    let location = location.trim();
    if location.is_empty() || location == "/" {
        return Ok(None);
    }

    let lower = location.to_ascii_lowercase();
    if lower == "open" {
        return Ok(None);
    }

    if lower.starts_with("open/") {
        let decoded = percent_decode(&location[5..])?;
        if decoded.trim().is_empty() {
            return Ok(None);
        }
        return Ok(Some(decoded));
    }

    Ok(Some(percent_decode(location)?))
}

fn percent_decode(value: &str) -> Result<String, String> {
    let bytes = value.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        match bytes[index] {
            b'+' => {
                decoded.push(b' ');
                index += 1;
            }
            b'%' => {
                if index + 2 >= bytes.len() {
                    return Err("Invalid percent-encoding in URL.".to_string());
                }
                let hi = decode_hex_digit(bytes[index + 1])
                    .ok_or_else(|| "Invalid percent-encoding in URL.".to_string())?;
                let lo = decode_hex_digit(bytes[index + 2])
                    .ok_or_else(|| "Invalid percent-encoding in URL.".to_string())?;
                decoded.push((hi << 4) | lo);
                index += 3;
            }
            byte => {
                decoded.push(byte);
                index += 1;
            }
        }
    }

    String::from_utf8(decoded).map_err(|_| "URL contains invalid UTF-8 after decoding.".to_string())
}

fn decode_hex_digit(value: u8) -> Option<u8> {
    match value {
        b'0'..=b'9' => Some(value - b'0'),
        b'a'..=b'f' => Some(value - b'a' + 10),
        b'A'..=b'F' => Some(value - b'A' + 10),
        _ => None,
    }
}

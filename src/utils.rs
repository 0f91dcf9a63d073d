use std::path::{Path, PathBuf};

/// Supported image file extensions
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "bmp", "gif"];

/// Parse hex color string to RGB tuple
/// Supports "#RRGGBB" and "RRGGBB" formats
pub fn hex_to_rgb(hex: &str) -> Option<(u8, u8, u8)> {
    let hex = hex.trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some((r, g, b))
}

/// Convert RGB to hue (0-360), saturation (0-1), lightness (0-1)
pub fn rgb_to_hsl(r: u8, g: u8, b: u8) -> (f32, f32, f32) {
    let r = r as f32 / 255.0;
    let g = g as f32 / 255.0;
    let b = b as f32 / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let lightness = (max + min) / 2.0;

    if delta < 0.0001 {
        // Achromatic (gray)
        return (0.0, 0.0, lightness);
    }

    let saturation = if lightness > 0.5 {
        delta / (2.0 - max - min)
    } else {
        delta / (max + min)
    };

    let hue = if (max - r).abs() < 0.0001 {
        60.0 * (((g - b) / delta) % 6.0)
    } else if (max - g).abs() < 0.0001 {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };

    let hue = if hue < 0.0 { hue + 360.0 } else { hue };

    (hue, saturation, lightness)
}

/// Map an RGB value onto a coarse color name (red, orange, ..., black, white, gray)
pub fn coarse_color_name(r: u8, g: u8, b: u8) -> &'static str {
    let (hue, saturation, lightness) = rgb_to_hsl(r, g, b);

    if lightness < 0.12 {
        return "black";
    }
    if lightness > 0.92 {
        return "white";
    }
    if saturation < 0.15 {
        return if lightness < 0.25 {
            "black"
        } else if lightness > 0.85 {
            "white"
        } else {
            "gray"
        };
    }

    match hue {
        h if !(15.0..345.0).contains(&h) => {
            if lightness < 0.3 {
                "brown"
            } else {
                "red"
            }
        }
        h if h < 45.0 => {
            if lightness < 0.45 {
                "brown"
            } else {
                "orange"
            }
        }
        h if h < 70.0 => "yellow",
        h if h < 170.0 => "green",
        h if h < 260.0 => "blue",
        h if h < 290.0 => "purple",
        _ => "pink",
    }
}

/// Coarse color name for a hex string, `None` if it doesn't parse
pub fn coarse_color_from_hex(hex: &str) -> Option<&'static str> {
    let (r, g, b) = hex_to_rgb(hex)?;
    Some(coarse_color_name(r, g, b))
}

/// Map hex colors to coarse names, keeping first-seen order without repeats
pub fn coarse_colors_from_hex<S: AsRef<str>>(colors: &[S]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for name in colors.iter().filter_map(|c| coarse_color_from_hex(c.as_ref())) {
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Greatest common divisor
pub fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Parse a human file size ("5mb", "1.5 MB", "500kb", "2048") into bytes
pub fn parse_size(input: &str) -> Option<u64> {
    let s = input.trim().to_lowercase().replace(' ', "");
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);
    let value: f64 = number.parse().ok()?;
    let multiplier = match unit {
        "" | "b" => 1.0,
        "k" | "kb" | "kib" => 1024.0,
        "m" | "mb" | "mib" => 1024.0 * 1024.0,
        "g" | "gb" | "gib" => 1024.0 * 1024.0 * 1024.0,
        _ => return None,
    };
    Some((value * multiplier).round() as u64)
}

/// Format bytes as "512 B", "1.5 KB", "3.2 MB"
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

/// Capitalize the first letter of every whitespace-separated word
pub fn title_case(s: &str) -> String {
    s.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Check if a path is a supported image file
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let ext = e.to_lowercase();
            IMAGE_EXTENSIONS.iter().any(|&supported| supported == ext)
        })
        .unwrap_or(false)
}

/// Expand tilde (~) in path
pub fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

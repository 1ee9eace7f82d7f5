//! Font discovery for report rendering.
//!
//! The report prefers the bundled Roboto family. When it cannot be found the renderer falls
//! back to a metric-compatible system family (Liberation Sans on Linux, Arial on Windows) and
//! logs a warning, so a fresh checkout still produces PDFs.

use std::env;
use std::io;
use std::path::{Path, PathBuf};

use genpdf::error::{Error, ErrorKind};
use genpdf::fonts::{FontData, FontFamily};
use log::{debug, warn};

/// Name of the bundled font family.
pub const DEFAULT_FONT_FAMILY_NAME: &str = "Roboto";

/// Overrides the bundled font directory.
pub const FONTS_DIR_ENV: &str = "CONSULTATION_REPORT_FONTS_DIR";

/// Overrides the directory searched for the system fallback family.
pub const SYSTEM_FONTS_DIR_ENV: &str = "CONSULTATION_REPORT_SYSTEM_FONTS_DIR";

/// File names of one font family, one per style.
struct FamilyFiles {
    name: &'static str,
    regular: &'static str,
    bold: &'static str,
    italic: &'static str,
    bold_italic: &'static str,
}

impl FamilyFiles {
    fn all(&self) -> [&'static str; 4] {
        [self.regular, self.bold, self.italic, self.bold_italic]
    }

    fn missing_in(&self, directory: &Path) -> Vec<&'static str> {
        self.all()
            .into_iter()
            .filter(|file| !directory.join(file).is_file())
            .collect()
    }
}

const BUNDLED_FAMILY: FamilyFiles = FamilyFiles {
    name: DEFAULT_FONT_FAMILY_NAME,
    regular: "Roboto-Regular.ttf",
    bold: "Roboto-Bold.ttf",
    italic: "Roboto-Italic.ttf",
    bold_italic: "Roboto-BoldItalic.ttf",
};

const LIBERATION_FAMILY: FamilyFiles = FamilyFiles {
    name: "Liberation Sans",
    regular: "LiberationSans-Regular.ttf",
    bold: "LiberationSans-Bold.ttf",
    italic: "LiberationSans-Italic.ttf",
    bold_italic: "LiberationSans-BoldItalic.ttf",
};

const ARIAL_FAMILY: FamilyFiles = FamilyFiles {
    name: "Arial",
    regular: "arial.ttf",
    bold: "arialbd.ttf",
    italic: "ariali.ttf",
    bold_italic: "arialbi.ttf",
};

const LIBERATION_DIRECTORIES: &[&str] = &[
    "/usr/share/fonts/truetype/liberation",
    "/usr/share/fonts/truetype/liberation2",
    "/usr/share/fonts/liberation-sans",
    "/usr/share/fonts/liberation",
];

fn env_path(var: &str) -> Option<PathBuf> {
    env::var_os(var).and_then(|value| {
        let path = PathBuf::from(value);
        if path.as_os_str().is_empty() {
            None
        } else {
            Some(path)
        }
    })
}

fn push_unique(candidates: &mut Vec<PathBuf>, candidate: PathBuf) {
    if !candidates.iter().any(|existing| existing == &candidate) {
        candidates.push(candidate);
    }
}

/// Directories searched for the bundled family, in priority order.
fn font_directory_candidates(configured: Option<&Path>) -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Some(path) = env_path(FONTS_DIR_ENV) {
        push_unique(&mut candidates, path);
    }

    if let Some(path) = configured {
        push_unique(&mut candidates, path.to_path_buf());
    }

    if let Ok(current_exe) = env::current_exe() {
        if let Some(bin_dir) = current_exe.parent() {
            push_unique(&mut candidates, bin_dir.join("assets/fonts"));
        }
    }

    push_unique(
        &mut candidates,
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("assets/fonts"),
    );

    candidates
}

fn resolve_font_directory(configured: Option<&Path>) -> Result<PathBuf, Error> {
    let mut attempts = Vec::new();

    for candidate in font_directory_candidates(configured) {
        if !candidate.is_dir() {
            attempts.push(format!("{} (directory missing)", candidate.display()));
            continue;
        }

        let missing = BUNDLED_FAMILY.missing_in(&candidate);
        if missing.is_empty() {
            return Ok(candidate);
        }
        attempts.push(format!(
            "{} (missing files [{}])",
            candidate.display(),
            missing.join(", ")
        ));
    }

    Err(Error::new(
        format!(
            "Unable to locate the {} font directory. Checked: {}. See assets/fonts/README.md or set {}.",
            DEFAULT_FONT_FAMILY_NAME,
            attempts.join(", "),
            FONTS_DIR_ENV
        ),
        io::Error::new(io::ErrorKind::NotFound, "bundled fonts directory not found"),
    ))
}

fn load_font(directory: &Path, file: &str, family: &str) -> Result<FontData, Error> {
    let path = directory.join(file);
    FontData::load(&path, None).map_err(|err| {
        let io_kind = if path.is_file() {
            io::ErrorKind::InvalidData
        } else {
            io::ErrorKind::NotFound
        };
        Error::new(
            format!("Failed to load {} font at {}: {}", family, path.display(), err),
            io::Error::new(io_kind, err.to_string()),
        )
    })
}

fn load_family(directory: &Path, files: &FamilyFiles) -> Result<FontFamily<FontData>, Error> {
    debug!("Loading {} fonts from {}", files.name, directory.display());
    Ok(FontFamily {
        regular: load_font(directory, files.regular, files.name)?,
        bold: load_font(directory, files.bold, files.name)?,
        italic: load_font(directory, files.italic, files.name)?,
        bold_italic: load_font(directory, files.bold_italic, files.name)?,
    })
}

fn system_fallbacks() -> Vec<(PathBuf, &'static FamilyFiles)> {
    let mut fallbacks = Vec::new();

    if let Some(path) = env_path(SYSTEM_FONTS_DIR_ENV) {
        fallbacks.push((path.clone(), &LIBERATION_FAMILY));
        fallbacks.push((path, &ARIAL_FAMILY));
    }

    for directory in LIBERATION_DIRECTORIES {
        fallbacks.push((PathBuf::from(directory), &LIBERATION_FAMILY));
    }

    for var in ["WINDIR", "SystemRoot"] {
        if let Some(root) = env_path(var) {
            fallbacks.push((root.join("Fonts"), &ARIAL_FAMILY));
        }
    }

    fallbacks
        .into_iter()
        .filter(|(directory, files)| directory.is_dir() && files.missing_in(directory).is_empty())
        .collect()
}

fn fonts_missing(err: &Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::IoError(io_err)
            if io_err.kind() == io::ErrorKind::NotFound
                || io_err.kind() == io::ErrorKind::PermissionDenied
    )
}

/// Loads the font family used by the report.
///
/// `configured` is the `report.fonts_dir` setting; the environment override takes precedence.
pub fn load_font_family(configured: Option<&Path>) -> Result<FontFamily<FontData>, Error> {
    let err = match resolve_font_directory(configured)
        .and_then(|directory| load_family(&directory, &BUNDLED_FAMILY))
    {
        Ok(family) => return Ok(family),
        Err(err) if fonts_missing(&err) => err,
        Err(err) => return Err(err),
    };

    for (directory, files) in system_fallbacks() {
        match load_family(&directory, files) {
            Ok(family) => {
                warn!(
                    "Bundled fonts unavailable ({}); falling back to system '{}' family in {}.",
                    err,
                    files.name,
                    directory.display()
                );
                return Ok(family);
            }
            Err(fallback_err) => {
                warn!(
                    "System '{}' family in {} could not be loaded: {}",
                    files.name,
                    directory.display(),
                    fallback_err
                );
            }
        }
    }

    Err(Error::new(
        format!("{err}; no usable system fallback font family was found"),
        io::Error::new(io::ErrorKind::NotFound, "report fonts are not available"),
    ))
}

/// Loads the font family from the default search locations.
pub fn default_font_family() -> Result<FontFamily<FontData>, Error> {
    load_font_family(None)
}

/// Indicates whether a usable font family can be found, bundled or system.
pub fn fonts_available(configured: Option<&Path>) -> bool {
    resolve_font_directory(configured).is_ok() || !system_fallbacks().is_empty()
}

/// Same as [`fonts_available`] without a configured directory.
pub fn default_fonts_available() -> bool {
    fonts_available(None)
}

use anyhow::Result;
use serde::ser::{Serialize, SerializeStruct, Serializer};

/// Trailing marker shown while a description is still streaming in
pub const CURSOR_MARKER: &str = "▌";

/// Extensions the intake surfaces accept
pub const ACCEPTED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// User-supplied access key. Lives only as long as the session that owns it.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            write!(f, "Credential(<empty>)")
        } else {
            write!(f, "Credential(<redacted>)")
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
            "png" => Some(ImageFormat::Png),
            _ => None,
        }
    }

    /// Intake filter: only the declared extension is looked at
    pub fn from_filename(filename: &str) -> Result<Self> {
        let ext = filename.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");

        match Self::from_extension(ext) {
            Some(format) => Ok(format),
            None => anyhow::bail!(
                "Unsupported file type '{}': expected one of {}",
                filename,
                ACCEPTED_EXTENSIONS.join(", ")
            ),
        }
    }

    pub fn media_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
        }
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Png => "png",
        };
        write!(f, "{}", s)
    }
}

/// An uploaded image, held in memory for the duration of one request.
/// The declared extension is trusted; contents are never sniffed.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub format: ImageFormat,
}

impl UploadedImage {
    pub fn from_upload(filename: impl Into<String>, bytes: Vec<u8>) -> Result<Self> {
        let filename = filename.into();
        let format = ImageFormat::from_filename(&filename)?;

        Ok(Self {
            bytes,
            filename,
            format,
        })
    }
}

/// Everything the UI surface collected for one analysis attempt
#[derive(Debug, Clone, Default)]
pub struct AnalysisInput {
    pub credential: Credential,
    pub image: Option<UploadedImage>,
    pub include_context: bool,
    pub context: Option<String>,
    pub triggered: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Warning {
    MissingImage,
    MissingCredential,
}

impl Warning {
    pub fn message(&self) -> &'static str {
        match self {
            Warning::MissingImage => "🌻 Por favor, sube una imagen antes de analizar.",
            Warning::MissingCredential => "🌷 Ingresa tu API key para continuar.",
        }
    }
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

/// One step of what the presentation layer should show
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayUpdate {
    Partial(String),  // Accumulated text + cursor marker
    Final(String),    // Full text, no cursor
    Warning(Warning),
    Error(String),
}

impl DisplayUpdate {
    pub fn kind(&self) -> &'static str {
        match self {
            DisplayUpdate::Partial(_) => "partial",
            DisplayUpdate::Final(_) => "final",
            DisplayUpdate::Warning(_) => "warning",
            DisplayUpdate::Error(_) => "error",
        }
    }

    /// What the user actually reads for this update
    pub fn text(&self) -> &str {
        match self {
            DisplayUpdate::Partial(text) | DisplayUpdate::Final(text) | DisplayUpdate::Error(text) => text,
            DisplayUpdate::Warning(warning) => warning.message(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, DisplayUpdate::Partial(_))
    }
}

/// Serialized as `{"kind": ..., "text": ...}` for the browser surface
impl Serialize for DisplayUpdate {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("DisplayUpdate", 2)?;
        state.serialize_field("kind", self.kind())?;
        state.serialize_field("text", self.text())?;
        state.end()
    }
}

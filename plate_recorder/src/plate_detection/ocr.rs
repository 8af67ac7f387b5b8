use leptess::tesseract;
use leptess::tesseract::TessApi;

use opencv::prelude::Mat;
use opencv::prelude::MatTraitConst;
use opencv::prelude::MatTraitConstManual;

use std::ffi::CString;

use crate::config::OcrSettings;
use crate::error::OcrError;

/// Anything that turns a binarized plate image into raw text.
pub trait OcrEngine: Send {
    fn recognize(&mut self, image: &Mat) -> Result<String, OcrError>;
}

/// Tesseract through leptess, configured for a single line of plate glyphs.
pub struct TesseractEngine {
    ocr: TessApi,
}

impl TesseractEngine {
    pub fn new(settings: &OcrSettings) -> Result<Self, OcrError> {
        let data_path = settings
            .tessdata_dir
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned());

        let mut api = tesseract::TessApi::new(data_path.as_deref(), &settings.language)
            .map_err(|e| OcrError::Init(format!("{e:?}")))?;

        // Re-init to pick the engine mode, leptess always uses the default one.
        let data_path_cstr = data_path.map(cstring).transpose()?;
        let lang = cstring(settings.language.clone())?;
        api.raw
            .init_4(
                data_path_cstr.as_deref(),
                Some(lang.as_ref()),
                settings.engine_mode.as_raw(),
            )
            .map_err(|e| OcrError::Init(e.to_string()))?;

        set_variable(&mut api, "tessedit_char_whitelist", &settings.whitelist)?;
        set_variable(
            &mut api,
            "tessedit_pageseg_mode",
            &settings.page_seg_mode.to_string(),
        )?;

        Ok(Self { ocr: api })
    }
}

fn cstring(value: String) -> Result<CString, OcrError> {
    CString::new(value).map_err(|e| OcrError::Init(e.to_string()))
}

fn set_variable(api: &mut TessApi, name: &str, value: &str) -> Result<(), OcrError> {
    api.raw
        .set_variable(&cstring(name.to_string())?, &cstring(value.to_string())?)
        .map_err(|e| OcrError::Init(format!("{name}: {e}")))
}

// The handle is created on the caller thread and then only used by the
// recognition worker it is moved into.
unsafe impl Send for TesseractEngine {}

impl OcrEngine for TesseractEngine {
    fn recognize(&mut self, image: &Mat) -> Result<String, OcrError> {
        if image.empty() {
            return Err(OcrError::EmptyImage);
        }
        // Make it contiguous, set_image wants a tightly packed buffer
        let packed = image.try_clone()?;
        let cols = packed.cols();
        let rows = packed.rows();
        let channels = packed.channels();
        self.ocr
            .raw
            .set_image(packed.data_bytes()?, cols, rows, channels, cols * channels)
            .map_err(|e| OcrError::Engine(e.to_string()))?;
        self.ocr
            .get_utf8_text()
            .map_err(|e| OcrError::Engine(e.to_string()))
    }
}

/// Keep ASCII letters and digits only, uppercased.
pub fn normalize_text(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

pub struct TextExtractor {
    engine: Box<dyn OcrEngine>,
}

impl TextExtractor {
    pub fn new(engine: Box<dyn OcrEngine>) -> Self {
        Self { engine }
    }

    pub fn tesseract(settings: &OcrSettings) -> Result<Self, OcrError> {
        Ok(Self::new(Box::new(TesseractEngine::new(settings)?)))
    }

    /// Normalized text, or the engine error.
    pub fn try_extract(&mut self, binary: &Mat) -> Result<String, OcrError> {
        let raw = self.engine.recognize(binary)?;
        Ok(normalize_text(&raw))
    }

    /// Normalized text; engine failures read as nothing.
    pub fn extract(&mut self, binary: &Mat) -> String {
        match self.try_extract(binary) {
            Ok(text) => text,
            Err(e) => {
                log::warn!("OCR failed, treating region as empty: {e}");
                String::new()
            }
        }
    }
}

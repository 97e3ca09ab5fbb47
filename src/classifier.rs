//! # File Classification
//!
//! Maps an uploaded file name to the [`ResourceType`] it is stored as.

use crate::models::ResourceType;

/// Decides the resource type of an uploaded file from its name.
pub trait FileClassifier {
    fn classify(&self, file_name: &str) -> ResourceType;
}

/// Classifies by file extension, case-insensitively.
///
/// | Extension                | Resource type         |
/// |--------------------------|-----------------------|
/// | `.pptx`                  | `WhiteboardProjector` |
/// | `.ppt` `.doc` `.docx` `.pdf` | `WhiteboardConvert` |
/// | `.ice` `.vf`             | `LocalCourseware`     |
/// | anything else            | `NormalResources`     |
#[derive(Clone, Copy, Debug, Default)]
pub struct ExtensionClassifier;

impl FileClassifier for ExtensionClassifier {
    fn classify(&self, file_name: &str) -> ResourceType {
        let extension = crate::utils::file_extension(file_name).to_ascii_lowercase();

        match extension.as_str() {
            ".pptx" => ResourceType::WhiteboardProjector,
            ".ppt" | ".doc" | ".docx" | ".pdf" => ResourceType::WhiteboardConvert,
            ".ice" | ".vf" => ResourceType::LocalCourseware,
            _ => ResourceType::NormalResources,
        }
    }
}

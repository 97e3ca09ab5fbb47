use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Classification of a stored file. Decides the shape of its payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceType {
    NormalResources,
    WhiteboardConvert,
    WhiteboardProjector,
    LocalCourseware,
    OnlineCourseware,
    Directory,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::NormalResources => "NormalResources",
            ResourceType::WhiteboardConvert => "WhiteboardConvert",
            ResourceType::WhiteboardProjector => "WhiteboardProjector",
            ResourceType::LocalCourseware => "LocalCourseware",
            ResourceType::OnlineCourseware => "OnlineCourseware",
            ResourceType::Directory => "Directory",
        }
    }

    /// Resource types that go through the asynchronous whiteboard conversion pipeline.
    pub fn is_whiteboard_convertible(&self) -> bool {
        matches!(
            self,
            ResourceType::WhiteboardConvert | ResourceType::WhiteboardProjector
        )
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NormalResources" => Ok(ResourceType::NormalResources),
            "WhiteboardConvert" => Ok(ResourceType::WhiteboardConvert),
            "WhiteboardProjector" => Ok(ResourceType::WhiteboardProjector),
            "LocalCourseware" => Ok(ResourceType::LocalCourseware),
            "OnlineCourseware" => Ok(ResourceType::OnlineCourseware),
            "Directory" => Ok(ResourceType::Directory),
            _ => Err(format!("Unknown resource type: {}", s)),
        }
    }
}

/// Progress of a file through the whiteboard conversion pipeline. Files enter
/// it as `None`; later steps are written by the conversion service.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConvertStep {
    None,
}

/// Resource-type dependent metadata stored with a file.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum FilePayload {
    Conversion {
        region: String,
        #[serde(rename = "convertStep")]
        convert_step: ConvertStep,
    },
    Empty {},
}

impl FilePayload {
    pub fn for_resource_type(resource_type: ResourceType, region: &str) -> Self {
        if resource_type.is_whiteboard_convertible() {
            FilePayload::Conversion {
                region: region.to_string(),
                convert_step: ConvertStep::None,
            }
        } else {
            FilePayload::Empty {}
        }
    }
}

/// In-flight upload between `start` and `finish`, stored as a hash of string fields.
#[derive(Clone, Debug, PartialEq)]
pub struct UploadSession {
    pub file_name: String,
    pub file_size: u64,
    pub target_directory_path: String,
    pub resource_type: ResourceType,
    /// UTC date of `start`; the object path is derived from it.
    pub upload_date: NaiveDate,
}

impl UploadSession {
    pub const FIELD_FILE_NAME: &'static str = "fileName";
    pub const FIELD_FILE_SIZE: &'static str = "fileSize";
    pub const FIELD_DIRECTORY_PATH: &'static str = "targetDirectoryPath";
    pub const FIELD_RESOURCE_TYPE: &'static str = "fileResourceType";
    pub const FIELD_UPLOAD_DATE: &'static str = "uploadDate";

    pub fn to_fields(&self) -> HashMap<String, String> {
        HashMap::from([
            (Self::FIELD_FILE_NAME.to_string(), self.file_name.clone()),
            (Self::FIELD_FILE_SIZE.to_string(), self.file_size.to_string()),
            (
                Self::FIELD_DIRECTORY_PATH.to_string(),
                self.target_directory_path.clone(),
            ),
            (
                Self::FIELD_RESOURCE_TYPE.to_string(),
                self.resource_type.as_str().to_string(),
            ),
            (
                Self::FIELD_UPLOAD_DATE.to_string(),
                self.upload_date.format("%Y-%m-%d").to_string(),
            ),
        ])
    }

    /// Rebuilds a session from its stored fields.
    ///
    /// On failure returns the breakdown of which fields were missing or unusable.
    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self, SessionFieldReport> {
        let get = |name: &str| fields.get(name).filter(|v| !v.is_empty());

        let file_name = get(Self::FIELD_FILE_NAME);
        let file_size = get(Self::FIELD_FILE_SIZE).and_then(|v| v.parse::<u64>().ok());
        let target_directory_path = get(Self::FIELD_DIRECTORY_PATH);
        let resource_type =
            get(Self::FIELD_RESOURCE_TYPE).and_then(|v| v.parse::<ResourceType>().ok());
        let upload_date = get(Self::FIELD_UPLOAD_DATE)
            .and_then(|v| NaiveDate::parse_from_str(v, "%Y-%m-%d").ok());

        match (
            file_name,
            file_size,
            target_directory_path,
            resource_type,
            upload_date,
        ) {
            (
                Some(file_name),
                Some(file_size),
                Some(target_directory_path),
                Some(resource_type),
                Some(upload_date),
            ) => Ok(Self {
                file_name: file_name.clone(),
                file_size,
                target_directory_path: target_directory_path.clone(),
                resource_type,
                upload_date,
            }),
            (file_name, file_size, target_directory_path, resource_type, upload_date) => {
                Err(SessionFieldReport {
                    file_name: file_name.is_some(),
                    file_size: file_size.is_some(),
                    target_directory_path: target_directory_path.is_some(),
                    resource_type: resource_type.is_some(),
                    upload_date: upload_date.is_some(),
                })
            }
        }
    }
}

/// Which session fields were present and valid when loading failed.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionFieldReport {
    pub file_name: bool,
    pub file_size: bool,
    pub target_directory_path: bool,
    pub resource_type: bool,
    pub upload_date: bool,
}

/// Durable record of a completed upload.
#[derive(Clone, Debug, PartialEq)]
pub struct FileRecord {
    pub file_id: Uuid,
    pub file_name: String,
    pub file_size: u64,
    pub file_url: String,
    pub directory_path: String,
    pub resource_type: ResourceType,
    pub payload: FilePayload,
}

/// Ownership edge from a user to a file.
#[derive(Clone, Debug, PartialEq)]
pub struct UserFileLink {
    pub user_id: String,
    pub file_id: Uuid,
}

/// Per-user storage accounting.
#[derive(Clone, Debug, PartialEq)]
pub struct UsageRecord {
    pub user_id: String,
    pub total_usage_bytes: u64,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StartUploadRequest {
    pub file_name: String,
    pub file_size: u64,
    pub target_directory_path: String,
}

/// Upload credential returned by `start`.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StartUploadResponse {
    pub file_id: Uuid,
    pub object_path: String,
    pub storage_domain: String,
    pub policy: String,
    pub signature: String,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FinishUploadRequest {
    pub file_id: Uuid,
}

/// Signed policy a client presents to the object store with its upload.
#[derive(Clone, Debug, PartialEq)]
pub struct UploadPolicy {
    pub policy: String,
    pub signature: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> UploadSession {
        UploadSession {
            file_name: "slides.pptx".to_string(),
            file_size: 2048,
            target_directory_path: "/docs/".to_string(),
            resource_type: ResourceType::WhiteboardProjector,
            upload_date: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
        }
    }

    #[test]
    fn session_fields_round_trip() {
        let fields = session().to_fields();
        assert_eq!(fields["fileSize"], "2048");
        assert_eq!(fields["uploadDate"], "2026-10-19");
        assert_eq!(UploadSession::from_fields(&fields).unwrap(), session());
    }

    #[test]
    fn missing_fields_are_reported() {
        let mut fields = session().to_fields();
        fields.remove("fileName");
        fields.insert("fileSize".to_string(), "not-a-number".to_string());

        let report = UploadSession::from_fields(&fields).unwrap_err();
        assert!(!report.file_name);
        assert!(!report.file_size);
        assert!(report.target_directory_path);
        assert!(report.resource_type);
        assert!(report.upload_date);
    }

    #[test]
    fn empty_hash_reports_every_field() {
        let report = UploadSession::from_fields(&HashMap::new()).unwrap_err();
        let json = serde_json::to_value(report).unwrap();
        assert_eq!(json["fileName"], false);
        assert_eq!(json["uploadDate"], false);
    }

    #[test]
    fn convertible_payload_carries_region() {
        let payload = FilePayload::for_resource_type(ResourceType::WhiteboardConvert, "us-sv");
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            serde_json::json!({ "region": "us-sv", "convertStep": "None" })
        );

        let payload = FilePayload::for_resource_type(ResourceType::NormalResources, "us-sv");
        assert_eq!(serde_json::to_string(&payload).unwrap(), "{}");
    }

    #[test]
    fn resource_type_parses_its_own_names() {
        for rt in [
            ResourceType::NormalResources,
            ResourceType::WhiteboardConvert,
            ResourceType::WhiteboardProjector,
            ResourceType::LocalCourseware,
            ResourceType::OnlineCourseware,
            ResourceType::Directory,
        ] {
            assert_eq!(rt.as_str().parse::<ResourceType>().unwrap(), rt);
        }
        assert!("Folder".parse::<ResourceType>().is_err());
    }
}

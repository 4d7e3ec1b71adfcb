use serde::Serialize;

/// Response to a document upload.
#[derive(Debug, Serialize)]
pub struct DocumentCreated {
    pub key: String,
}

#[derive(Debug, Serialize)]
pub struct Info {
    pub app_name: String,
    pub app_url: String,
}

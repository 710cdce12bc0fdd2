use super::FileType;

pub fn bucket_for(file_type: FileType) -> &'static str {
    match file_type {
        FileType::Image => "images",
        FileType::Video => "videos",
        FileType::Other => "files",
    }
}

pub fn object_path(bucket: &str, filename: &str) -> String {
    format!("{}/{}", bucket, filename)
}

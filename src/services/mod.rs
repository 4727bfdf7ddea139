pub mod range;
pub mod video_file_service;

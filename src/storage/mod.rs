pub mod drive;
pub mod local;

pub use drive::{is_unauthorized, DriveClient, DriveError, DriveFile, UploadedFile, UserInfo};
pub use local::{LoadedFile, LocalStore};

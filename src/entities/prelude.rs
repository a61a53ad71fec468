pub use super::file_thumbnails::Entity as FileThumbnails;
pub use super::files::Entity as Files;
pub use super::share_links::Entity as ShareLinks;
pub use super::virus_scans::Entity as VirusScans;

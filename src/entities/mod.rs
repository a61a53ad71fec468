pub mod prelude;

pub mod file_thumbnails;
pub mod files;
pub mod share_links;
pub mod virus_scans;

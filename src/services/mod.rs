pub mod authorization;
pub mod expiration;
pub mod file_service;
pub mod scan_gate;
pub mod scanner;
pub mod share_service;
pub mod storage;
pub mod thumbnail_service;

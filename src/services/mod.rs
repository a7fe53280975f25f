pub mod controller;
pub mod fashn;
pub mod ingestion;
pub mod media;
pub mod polling;
pub mod removal;
pub mod storage;

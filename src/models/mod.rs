pub mod irondb;

pub mod add;
pub mod diff;
pub mod init;
pub mod passwd;
pub mod rekey;
pub mod show;

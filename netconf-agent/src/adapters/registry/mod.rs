pub mod repo_file;
pub mod repo_mem;

pub use repo_file::FileSessionRegistry;
pub use repo_mem::InMemorySessionRegistry;

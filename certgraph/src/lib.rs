pub mod commands;
pub mod handlers;

// Re-export commonly used handler functions for convenience
pub use handlers::{
    build_walk_options, load_hosts_from_file, load_seeds_from_source, parse_host_line,
};

// Re-export walk functionality from certgraph-core
pub use certgraph_core::walk::{WalkOptions, execute_walk, normalize_seed};

use std::path::PathBuf;

// Fixed locations used outside dev mode when no project dir can be resolved

pub fn system_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/facevote")
}

pub fn system_config_file() -> PathBuf {
    PathBuf::from("/etc/facevote/facevote.toml")
}

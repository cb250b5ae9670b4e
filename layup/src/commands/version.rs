/// Get the version string for layup and liblayup
pub fn get_version_string() -> String {
    format!(
        "layup {}\nliblayup {}",
        env!("CARGO_PKG_VERSION"),
        liblayup::version()
    )
}

/// Print version information to stdout
pub fn print_version() {
    println!("{}", get_version_string());
}

#[cfg(test)]
#[path = "version_tests.rs"]
mod tests;

use colored::Colorize;

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Print something that will be added
pub fn added(item: &str) {
    println!("  {} {}", "+".green().bold(), item);
}

/// Print something that will be removed
pub fn removed(item: &str) {
    println!("  {} {}", "-".red().bold(), item);
}

/// Print something that will be changed in place
pub fn changed(item: &str) {
    println!("  {} {}", "~".yellow().bold(), item);
}

/// Print a neutral list item
pub fn item(item: &str) {
    println!("  {} {}", "•".dimmed(), item);
}

/// `1 package`, `3 packages`
pub fn count(n: usize, noun: &str) -> String {
    if n == 1 {
        format!("{n} {noun}")
    } else {
        format!("{n} {noun}s")
    }
}

/// Path with the home directory shown as `~`
pub fn tilde(path: &std::path::Path) -> String {
    let display = path.display().to_string();
    match dirs::home_dir() {
        Some(home) => match path.strip_prefix(&home) {
            Ok(rest) if rest.as_os_str().is_empty() => "~".to_string(),
            Ok(rest) => format!("~/{}", rest.display()),
            Err(_) => display,
        },
        None => display,
    }
}

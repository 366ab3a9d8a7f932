//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code in the viewer crates MUST NOT call sleep methods.
//! **Exceptions**: Reconnect backoff (retry logic only), periodic tasks built
//! on `tokio::time::interval`, test code.

use std::fs;
use std::path::Path;

use architectural_enforcement::{rust_sources, workspace_root, PRODUCTION_DIRS};

/// Test that production code does not contain sleep() calls
#[test]
fn test_no_sleep_in_production_code() {
    let violations = find_sleep_violations();

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Sleep calls found in production code!\n");

        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }

        eprintln!("\n✅ ACCEPTABLE sleep uses:");
        eprintln!("  - Backoff delay before a reconnect attempt");
        eprintln!("  - Test code (#[test] or #[tokio::test] functions)");
        eprintln!("  - Periodic tasks using tokio::time::interval()");
        eprintln!("\n❌ FORBIDDEN:");
        eprintln!("  - Sleep in polling loops");
        eprintln!("  - Sleep as poor man's synchronization");
        eprintln!("  - Sleep to 'wait' for events (use async I/O!)");

        panic!(
            "\nFound {} sleep violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}

/// The scan must actually see the production trees
#[test]
fn test_production_dirs_exist() {
    for dir in PRODUCTION_DIRS {
        let path = workspace_root().join(dir);
        assert!(path.is_dir(), "missing production dir {}", path.display());
        assert!(!rust_sources(&path).is_empty(), "no sources in {}", path.display());
    }
}

/// Find all sleep() calls in production code
fn find_sleep_violations() -> Vec<String> {
    let mut violations = Vec::new();
    for dir in PRODUCTION_DIRS {
        for file in rust_sources(&workspace_root().join(dir)) {
            check_file(&file, &mut violations);
        }
    }
    violations
}

fn check_file(path: &Path, violations: &mut Vec<String>) {
    let Ok(content) = fs::read_to_string(path) else {
        return;
    };

    let lines: Vec<&str> = content.lines().collect();
    let test_module_start = lines
        .iter()
        .position(|line| line.trim() == "#[cfg(test)]")
        .unwrap_or(lines.len());

    for (idx, line) in lines.iter().enumerate() {
        // Skip comments
        let code_part = line.split("//").next().unwrap_or(line);

        if !(code_part.contains("::sleep(") || code_part.contains(".sleep(")) {
            continue;
        }
        if idx > test_module_start || is_in_test_function(&lines, idx) {
            continue;
        }
        if is_backoff_context(&lines, idx) || is_interval_pattern(&lines, idx) {
            continue;
        }

        violations.push(format!("{}:{} - {}", path.display(), idx + 1, line.trim()));
    }
}

/// Check if line is inside a test function
fn is_in_test_function(lines: &[&str], current_idx: usize) -> bool {
    for i in (0..current_idx).rev() {
        let line = lines[i].trim();

        if line.starts_with("#[test]") || line.starts_with("#[tokio::test") {
            return true;
        }
        if (line.starts_with("fn ") || line.starts_with("async fn ")) && !line.contains("test") {
            return false;
        }
        // Stop at module boundaries
        if line.starts_with("mod ") || line.starts_with("impl ") {
            return false;
        }
    }
    false
}

/// Check if sleep waits out a computed reconnect delay
fn is_backoff_context(lines: &[&str], current_idx: usize) -> bool {
    let context_range = current_idx.saturating_sub(15)..std::cmp::min(current_idx + 5, lines.len());

    let mut has_delay_calc = false;
    let mut has_retry_context = false;

    for line in &lines[context_range] {
        let line = line.to_lowercase();

        // Exponential (2^n, bit shift) or linear (n * base) delay
        if line.contains("<<")
            || line.contains("pow")
            || line.contains("* 2")
            || line.contains("saturating_mul")
            || line.contains("delay")
        {
            has_delay_calc = true;
        }

        if line.contains("retry")
            || line.contains("reconnect")
            || line.contains("backoff")
            || line.contains("attempt")
        {
            has_retry_context = true;
        }
    }

    has_delay_calc && has_retry_context
}

/// Check if this is a `tokio::time::interval` pattern (acceptable for periodic tasks)
fn is_interval_pattern(lines: &[&str], current_idx: usize) -> bool {
    let backward = current_idx.saturating_sub(20)..current_idx;
    if lines[backward]
        .iter()
        .any(|line| line.contains("interval.tick()") || line.contains("tokio::time::interval"))
    {
        return true;
    }

    let forward = current_idx..std::cmp::min(current_idx + 5, lines.len());
    lines[forward].iter().any(|line| line.contains("interval.tick()"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_sleep_is_not_test_code() {
        let code = vec![
            "fn bad_function() {",
            "    tokio::time::sleep(Duration::from_millis(10)).await;",
            "}",
        ];
        assert!(!is_in_test_function(&code, 1));
        assert!(!is_backoff_context(&code, 1));
        assert!(!is_interval_pattern(&code, 1));
    }

    #[test]
    fn test_linear_backoff_detection() {
        let code = vec![
            "fn schedule(&self, attempt: u32, delay: Duration) {",
            "    tokio::spawn(async move {",
            "        tokio::time::sleep(delay).await;",
            "        connection.retry(generation, attempt).await;",
            "    });",
            "}",
        ];
        assert!(is_backoff_context(&code, 2));
    }

    #[test]
    fn test_exponential_backoff_detection() {
        let code = vec![
            "fn reconnect() {",
            "    let wait = base * (1 << attempt);",
            "    tokio::time::sleep(wait).await;",
            "}",
        ];
        assert!(is_backoff_context(&code, 2));
    }

    #[test]
    fn test_sleep_in_test_fn_allowed() {
        let code = vec![
            "#[tokio::test]",
            "async fn test_waits() {",
            "    tokio::time::sleep(Duration::from_millis(5)).await;",
            "}",
        ];
        assert!(is_in_test_function(&code, 2));
    }
}

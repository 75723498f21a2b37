//! Color support with NO_COLOR and CLICOLOR environment variable handling.

use colored::control;

/// Configure color output for the whole program. Call early in `main()`.
///
/// `NO_COLOR` (https://no-color.org/) takes precedence over everything,
/// `CLICOLOR_FORCE` forces colors even without a TTY, and `CLICOLOR=0`
/// disables them.
pub fn init_colors() {
    if std::env::var("NO_COLOR").is_ok() {
        control::set_override(false);
        return;
    }

    if std::env::var("CLICOLOR_FORCE")
        .map(|v| v != "0")
        .unwrap_or(false)
    {
        control::set_override(true);
        return;
    }

    if std::env::var("CLICOLOR").map(|v| v == "0").unwrap_or(false) {
        control::set_override(false);
    }
}

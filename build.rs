// ABOUTME: Build script for compile-time feature validation
// ABOUTME: Warns when the binary would relay Steam to nowhere

fn main() {
    let has_slack = cfg!(feature = "slack");
    let has_irc = cfg!(feature = "irc");

    if !has_slack && !has_irc {
        println!(
            "cargo::warning=No network features enabled. \
             Enable at least one of: slack, irc"
        );
    }
}

/// Format a duration in whole seconds as `MM:SS`.
///
/// Minutes are not wrapped at 60, so 75 minutes renders as `75:00`.
pub fn format_mm_ss(total_secs: u64) -> String {
    format!("{:02}:{:02}", total_secs / 60, total_secs % 60)
}

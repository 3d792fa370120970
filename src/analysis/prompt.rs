/// Instructions sent ahead of every batch of log lines.
pub const DEFAULT_PROMPT: &str = "\
You are reviewing IT log lines for operational issues, vulnerabilities and attacks.
Report each finding as a JSON object with these fields:
- category: a short label you choose for the finding (1 to 3 words)
- severity: one of INFORMATION, SUSPICIOUS, DANGEROUS, CRITICAL
- description: what happened, how to locate the culprit, and how to remediate it
- ips: an array of the IP addresses involved, empty if there are none
- logs: an array of the relevant log lines; when more than 5 lines are relevant, list the first or most important 5 and end the array with the string \"N more relevant log entries\", where N is the number of lines left out
- start: the time of the first log line belonging to the finding

Put all finding objects in a single top level JSON array inside <output></output> tags.
If nothing is worth reporting, reply with ALL CLEAR and no JSON.";

/// Prompt text followed by the batch lines, one per line.
pub fn build_prompt<'a>(prompt: &str, lines: impl IntoIterator<Item = &'a str>) -> String {
    let mut content = String::from(prompt);
    for line in lines {
        content.push('\n');
        content.push_str(line);
    }
    content
}

//! Mention-prefixed command parsing
//!
//! The first line of a message carries the bot mention, the subcommand and
//! its positional arguments; every following line is the free-text body.
//! Parsing never fails loudly: bad input becomes [`ParseOutcome::Error`] and
//! help requests become [`ParseOutcome::Help`], both answered in-thread.

use std::fmt;

pub const PROGRAM_NAME: &str = "Cluster support bot";
pub const DESCRIPTION: &str = "I help you collaborate on per-cluster support issues ( https://github.com/openshift/cluster-support-bot/ ).";

const CLUSTER_METAVAR: &str = "ID";
const CLUSTER_HELP: &str = "The cluster ID.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subcommand {
    Help,
    Summary,
    SetSummary,
    Detail,
    Comment,
}

impl Subcommand {
    pub const ALL: [Subcommand; 5] = [
        Subcommand::Help,
        Subcommand::Summary,
        Subcommand::SetSummary,
        Subcommand::Detail,
        Subcommand::Comment,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Help => "help",
            Self::Summary => "summary",
            Self::SetSummary => "set-summary",
            Self::Detail => "detail",
            Self::Comment => "comment",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|sub| sub.name() == name)
    }

    pub fn help(self) -> &'static str {
        match self {
            Self::Help => "Show this help.",
            Self::Summary => "Summarize a cluster by ID.",
            Self::SetSummary => "Set (or edit) the cluster summary.  The line following the set-summary command will be used in the summary subject, and subsequent lines will be used in the summary body.",
            Self::Detail => "Show the cluster summary together with its current summary note and related notes.",
            Self::Comment => "Add a comment on a cluster by ID.  The line following the comment command will be used in the comment subject, and subsequent lines will be used in the comment body.",
        }
    }

    pub fn takes_cluster(self) -> bool {
        !matches!(self, Self::Help)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Summary { cluster: String },
    SetSummary { cluster: String, body: String },
    Detail { cluster: String },
    Comment { cluster: String, body: String },
}

impl Command {
    pub fn subcommand(&self) -> Subcommand {
        match self {
            Self::Help => Subcommand::Help,
            Self::Summary { .. } => Subcommand::Summary,
            Self::SetSummary { .. } => Subcommand::SetSummary,
            Self::Detail { .. } => Subcommand::Detail,
            Self::Comment { .. } => Subcommand::Comment,
        }
    }

    pub fn cluster(&self) -> Option<&str> {
        match self {
            Self::Help => None,
            Self::Summary { cluster }
            | Self::SetSummary { cluster, .. }
            | Self::Detail { cluster }
            | Self::Comment { cluster, .. } => Some(cluster),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelpScope {
    Global,
    Subcommand(Subcommand),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    message: String,
}

impl ParseError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    Parsed(Command),
    Help(HelpScope),
    Error(ParseError),
}

fn is_help_flag(token: &str) -> bool {
    token == "-h" || token == "--help"
}

fn choices() -> String {
    let names: Vec<&str> = Subcommand::ALL.iter().map(|sub| sub.name()).collect();
    format!("{{{}}}", names.join(","))
}

fn invalid_choice(name: &str) -> ParseError {
    let quoted: Vec<String> = Subcommand::ALL
        .iter()
        .map(|sub| format!("'{}'", sub.name()))
        .collect();
    ParseError::new(format!(
        "argument {}: invalid choice: '{}' (choose from {})",
        choices(),
        name,
        quoted.join(", ")
    ))
}

/// Splits a trimmed message into its command line and body.
fn split_command_line(text: &str) -> (&str, &str) {
    let trimmed = text.trim();
    trimmed.split_once('\n').unwrap_or((trimmed, ""))
}

/// Parses `text`, whose first token is the bot mention.
pub fn parse_command(text: &str) -> ParseOutcome {
    let (command_line, body) = split_command_line(text);
    let mut tokens = command_line.split_whitespace().skip(1);

    let Some(name) = tokens.next() else {
        return ParseOutcome::Help(HelpScope::Global);
    };
    if is_help_flag(name) {
        return ParseOutcome::Help(HelpScope::Global);
    }
    let Some(subcommand) = Subcommand::from_name(name) else {
        return ParseOutcome::Error(invalid_choice(name));
    };

    let args: Vec<&str> = tokens.collect();
    if args.iter().any(|arg| is_help_flag(arg)) {
        return ParseOutcome::Help(HelpScope::Subcommand(subcommand));
    }

    let mut cluster = None;
    let mut extras = Vec::new();
    for arg in args {
        if subcommand.takes_cluster() && cluster.is_none() && !arg.starts_with('-') {
            cluster = Some(arg.to_string());
        } else {
            extras.push(arg);
        }
    }

    if subcommand.takes_cluster() && cluster.is_none() {
        return ParseOutcome::Error(ParseError::new(format!(
            "the following arguments are required: {}",
            CLUSTER_METAVAR
        )));
    }
    if !extras.is_empty() {
        return ParseOutcome::Error(ParseError::new(format!(
            "unrecognized arguments: {}",
            extras.join(" ")
        )));
    }

    let body = body.to_string();
    let command = match (subcommand, cluster) {
        (Subcommand::Help, _) => Command::Help,
        (Subcommand::Summary, Some(cluster)) => Command::Summary { cluster },
        (Subcommand::SetSummary, Some(cluster)) => Command::SetSummary { cluster, body },
        (Subcommand::Detail, Some(cluster)) => Command::Detail { cluster },
        (Subcommand::Comment, Some(cluster)) => Command::Comment { cluster, body },
        (_, None) => {
            return ParseOutcome::Error(ParseError::new(format!(
                "the following arguments are required: {}",
                CLUSTER_METAVAR
            )))
        }
    };
    ParseOutcome::Parsed(command)
}

/// Usage text for the whole bot or a single subcommand.
pub fn help_text(scope: HelpScope) -> String {
    match scope {
        HelpScope::Global => global_help(),
        HelpScope::Subcommand(subcommand) => subcommand_help(subcommand),
    }
}

fn global_help() -> String {
    let mut lines = vec![
        format!("usage: {} [-h] {} ...", PROGRAM_NAME, choices()),
        String::new(),
        DESCRIPTION.to_string(),
        String::new(),
        "positional arguments:".to_string(),
        format!("  {}", choices()),
    ];
    for subcommand in Subcommand::ALL {
        lines.push(format!("    {:<20}{}", subcommand.name(), subcommand.help()));
    }
    lines.push(String::new());
    lines.push("optional arguments:".to_string());
    lines.push(format!("  {:<22}show this help message and exit", "-h, --help"));
    lines.join("\n")
}

fn subcommand_help(subcommand: Subcommand) -> String {
    let mut lines = Vec::new();
    if subcommand.takes_cluster() {
        lines.push(format!(
            "usage: {} {} [-h] {}",
            PROGRAM_NAME,
            subcommand.name(),
            CLUSTER_METAVAR
        ));
        lines.push(String::new());
        lines.push("positional arguments:".to_string());
        lines.push(format!("  {:<12}{}", CLUSTER_METAVAR, CLUSTER_HELP));
    } else {
        lines.push(format!("usage: {} {} [-h]", PROGRAM_NAME, subcommand.name()));
    }
    lines.push(String::new());
    lines.push("optional arguments:".to_string());
    lines.push(format!("  {:<12}show this help message and exit", "-h, --help"));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const MENTION: &str = "<@U0BOT> ";

    fn parse(rest: &str) -> ParseOutcome {
        parse_command(&format!("{}{}", MENTION, rest))
    }

    #[test]
    fn parses_summary_with_cluster() {
        assert_eq!(
            parse("summary ABC"),
            ParseOutcome::Parsed(Command::Summary {
                cluster: "ABC".to_string()
            })
        );
    }

    #[test]
    fn set_summary_body_is_everything_after_first_line() {
        assert_eq!(
            parse("set-summary ABC\nTitle\nline one\nline two\n"),
            ParseOutcome::Parsed(Command::SetSummary {
                cluster: "ABC".to_string(),
                body: "Title\nline one\nline two".to_string(),
            })
        );
    }

    #[test]
    fn single_line_command_has_empty_body() {
        assert_eq!(
            parse("comment ABC"),
            ParseOutcome::Parsed(Command::Comment {
                cluster: "ABC".to_string(),
                body: String::new(),
            })
        );
    }

    #[test]
    fn unknown_command_lists_choices() {
        let ParseOutcome::Error(err) = parse("bogus-command") else {
            panic!("expected parse error");
        };
        assert_eq!(
            err.message(),
            "argument {help,summary,set-summary,detail,comment}: invalid choice: 'bogus-command' (choose from 'help', 'summary', 'set-summary', 'detail', 'comment')"
        );
    }

    #[test]
    fn missing_cluster_is_reported() {
        let ParseOutcome::Error(err) = parse("detail") else {
            panic!("expected parse error");
        };
        assert_eq!(err.message(), "the following arguments are required: ID");
    }

    #[test]
    fn extra_arguments_are_reported() {
        let ParseOutcome::Error(err) = parse("summary ABC DEF --verbose") else {
            panic!("expected parse error");
        };
        assert_eq!(err.message(), "unrecognized arguments: DEF --verbose");

        let ParseOutcome::Error(err) = parse("help me") else {
            panic!("expected parse error");
        };
        assert_eq!(err.message(), "unrecognized arguments: me");
    }

    #[test]
    fn help_requests_have_scope() {
        assert_eq!(parse("help"), ParseOutcome::Parsed(Command::Help));
        assert_eq!(parse("--help"), ParseOutcome::Help(HelpScope::Global));
        assert_eq!(parse(""), ParseOutcome::Help(HelpScope::Global));
        assert_eq!(
            parse("summary -h"),
            ParseOutcome::Help(HelpScope::Subcommand(Subcommand::Summary))
        );
        assert_eq!(
            parse("set-summary ABC --help\nsubject"),
            ParseOutcome::Help(HelpScope::Subcommand(Subcommand::SetSummary))
        );
    }

    #[test]
    fn command_line_tokens_split_on_any_whitespace() {
        assert_eq!(
            parse("  detail\tABC  "),
            ParseOutcome::Parsed(Command::Detail {
                cluster: "ABC".to_string()
            })
        );
    }

    #[test]
    fn global_help_lists_every_subcommand() {
        let text = help_text(HelpScope::Global);
        assert!(text.starts_with("usage: Cluster support bot [-h] {help,summary,set-summary,detail,comment} ..."));
        assert!(text.contains(DESCRIPTION));
        for subcommand in Subcommand::ALL {
            assert!(text.contains(subcommand.help()), "{}", subcommand.name());
        }
    }

    #[test]
    fn subcommand_help_shows_cluster_argument() {
        let text = help_text(HelpScope::Subcommand(Subcommand::Detail));
        assert!(text.starts_with("usage: Cluster support bot detail [-h] ID"));
        assert!(text.contains("The cluster ID."));

        let text = help_text(HelpScope::Subcommand(Subcommand::Help));
        assert!(!text.contains("The cluster ID."));
    }

    #[test]
    fn command_exposes_cluster() {
        let command = Command::Comment {
            cluster: "ABC".to_string(),
            body: String::new(),
        };
        assert_eq!(command.cluster(), Some("ABC"));
        assert_eq!(command.subcommand(), Subcommand::Comment);
        assert_eq!(Command::Help.cluster(), None);
    }
}

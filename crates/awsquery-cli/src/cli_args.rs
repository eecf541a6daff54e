//! Argument model and the `--`-sectioned command line parser.
//!
//! The grammar is `awsquery [flags] SERVICE ACTION [filters] [-- columns]`.
//! With two `--` separators the sections become resource filters (applied to
//! resolver source listings), value filters, and column filters. Sections
//! are split before clap runs because clap consumes `--` itself.

use clap::Parser;
use thiserror::Error;

use awsquery_core::sanitize_token;
use awsquery_resolver::{HintParseError, ResolutionHint};

#[derive(Debug, Error)]
pub enum CliParseError {
    #[error(transparent)]
    Clap(#[from] clap::Error),
    #[error("invalid -p parameter '{raw}': expected KEY=VALUE")]
    BadParameter { raw: String },
    #[error(transparent)]
    BadHint(#[from] HintParseError),
    #[error("too many '--' separators: at most resource -- value -- column sections are supported")]
    TooManySections,
}

#[derive(Debug, Parser)]
#[command(
    name = "awsquery",
    about = "Query read-only AWS APIs with filtering and automatic parameter resolution",
    version
)]
pub struct Cli {
    #[arg(long, help = "Describe the calls that would be made without executing them")]
    pub dry_run: bool,

    #[arg(short = 'j', long = "json", help = "Emit records as JSON instead of a table")]
    pub json: bool,

    #[arg(short = 'k', long = "keys", help = "Print the union of record key paths and exit")]
    pub keys: bool,

    #[arg(short = 'd', long = "debug", help = "Enable debug diagnostics on stderr")]
    pub debug: bool,

    #[arg(long, env = "AWS_REGION", help = "AWS region override")]
    pub region: Option<String>,

    #[arg(long, env = "AWS_PROFILE", help = "AWS credential profile")]
    pub profile: Option<String>,

    #[arg(
        short = 'p',
        long = "param",
        value_name = "KEY=VALUE",
        help = "Explicit request parameter; repeatable, repeated keys accumulate into a list"
    )]
    pub param: Vec<String>,

    #[arg(
        short = 'i',
        long = "hint",
        value_name = "SOURCE:FIELD:LIMIT",
        help = "Resolution hint, one per unresolved required parameter, in order"
    )]
    pub hint: Vec<String>,

    #[arg(
        long = "max-fanout",
        env = "AWSQUERY_MAX_FANOUT",
        default_value_t = 100,
        help = "Ceiling on fanned-out calls per invocation"
    )]
    pub max_fanout: usize,

    #[arg(
        long = "fanout-parallelism",
        env = "AWSQUERY_FANOUT_PARALLELISM",
        default_value_t = 8,
        help = "Concurrent fan-out calls in flight at once"
    )]
    pub fanout_parallelism: usize,

    #[arg(
        long = "max-pages",
        env = "AWSQUERY_MAX_PAGES",
        default_value_t = 50,
        help = "Pagination cap per call"
    )]
    pub max_pages: usize,

    #[arg(help = "AWS service name (for example ec2)")]
    pub service: Option<String>,

    #[arg(help = "Operation name in kebab, snake, or Camel case")]
    pub action: Option<String>,

    #[arg(help = "Filter tokens for the section before the first --")]
    pub filters: Vec<String>,
}

/// Fully parsed command line: clap flags plus the `--` sections.
#[derive(Debug)]
pub struct ParsedCommand {
    pub cli: Cli,
    pub resource_filters: Vec<String>,
    pub value_filters: Vec<String>,
    pub column_filters: Vec<String>,
    pub parameters: Vec<(String, String)>,
    pub hints: Vec<ResolutionHint>,
}

/// Splits the raw arguments on standalone `--` and parses each section.
pub fn parse_command_line<I>(args: I) -> Result<ParsedCommand, CliParseError>
where
    I: IntoIterator<Item = String>,
{
    let mut sections: Vec<Vec<String>> = vec![Vec::new()];
    for arg in args {
        if arg == "--" {
            sections.push(Vec::new());
        } else if let Some(section) = sections.last_mut() {
            section.push(arg);
        }
    }
    if sections.len() > 3 {
        return Err(CliParseError::TooManySections);
    }

    let mut clap_args = vec!["awsquery".to_string()];
    clap_args.extend(sections[0].iter().cloned());
    let cli = Cli::try_parse_from(&clap_args)?;

    let sanitize_all = |tokens: &[String]| -> Vec<String> {
        tokens
            .iter()
            .map(|token| sanitize_token(token))
            .filter(|token| !token.is_empty())
            .collect()
    };
    let leading = sanitize_all(&cli.filters);

    let (resource_filters, value_filters, column_filters) = match sections.len() {
        1 => (Vec::new(), leading, Vec::new()),
        2 => (Vec::new(), leading, sanitize_all(&sections[1])),
        _ => (leading, sanitize_all(&sections[1]), sanitize_all(&sections[2])),
    };

    let mut parameters = Vec::new();
    for raw in &cli.param {
        let Some((key, value)) = raw.split_once('=') else {
            return Err(CliParseError::BadParameter { raw: raw.clone() });
        };
        if key.trim().is_empty() {
            return Err(CliParseError::BadParameter { raw: raw.clone() });
        }
        parameters.push((key.trim().to_string(), value.to_string()));
    }

    let hints = cli
        .hint
        .iter()
        .map(|raw| ResolutionHint::parse(raw))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ParsedCommand {
        cli,
        resource_filters,
        value_filters,
        column_filters,
        parameters,
        hints,
    })
}

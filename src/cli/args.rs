use clap::{ArgAction, Parser};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "recordharvest",
    version,
    about = "fetch, filter and export custom-object records",
    long_about = "recordharvest pages through every record of a custom object, trying each upstream region until one answers, then filters, pages and exports the result.\n\nExamples:\n  recordharvest -k $KEY -o orders\n  recordharvest -k $KEY -o orders --field tier --value gold --value silver --page-size 50\n  recordharvest -k $KEY -o orders --field createdAt --from 2024-01-01 --to 2024-03-31T23:59:59Z --export\n  recordharvest -k $KEY -o orders --field tier --value gold --contact-list \"Gold members\"\n\nTip: Use --config to persist credentials and keep CLI invocations short."
)]
pub struct CliArgs {
    #[arg(
        short = 'v',
        long = "verbose",
        action = ArgAction::Count,
        help_heading = "Output",
        help = "Increase log verbosity (-v, -vv)."
    )]
    pub verbose: u8,

    #[arg(
        short = 'n',
        long = "no-color",
        help_heading = "Output",
        help = "Disable colored output."
    )]
    pub no_color: bool,

    #[arg(
        short = 'k',
        long = "api-key",
        value_name = "KEY",
        env = "RECORDHARVEST_API_KEY",
        hide_env_values = true,
        help_heading = "Input",
        help = "Upstream API key."
    )]
    pub api_key: Option<String>,

    #[arg(
        short = 'o',
        long = "object-key",
        visible_alias = "object",
        value_name = "KEY",
        help_heading = "Input",
        help = "Custom object key whose records are fetched."
    )]
    pub object_key: Option<String>,

    #[arg(
        short = 'C',
        long = "config",
        value_name = "FILE",
        help_heading = "Input",
        help = "Path to config file (defaults to ~/.recordharvest/config.yml)."
    )]
    pub config: Option<String>,

    #[arg(
        long = "init-config",
        help_heading = "Input",
        help = "Write a commented default config file and exit."
    )]
    pub init_config: bool,

    #[arg(
        short = 'e',
        long = "endpoint",
        value_name = "URL",
        action = ArgAction::Append,
        help_heading = "Upstream",
        help = "Candidate base endpoint, in priority order (repeatable; replaces the built-in list)."
    )]
    pub endpoint: Vec<String>,

    #[arg(
        long = "max-pages",
        value_name = "N",
        help_heading = "Upstream",
        help = "Stop after this many pages even if more are reported."
    )]
    pub max_pages: Option<usize>,

    #[arg(
        short = 'T',
        long = "timeout",
        value_name = "SECONDS",
        help_heading = "Upstream",
        help = "Per-request timeout in seconds."
    )]
    pub timeout: Option<usize>,

    #[arg(
        short = 'p',
        long = "proxy",
        value_name = "URL",
        help_heading = "Upstream",
        help = "HTTP proxy URL (e.g. http://127.0.0.1:8080)."
    )]
    pub proxy: Option<String>,

    #[arg(
        short = 'f',
        long = "field",
        visible_alias = "filter-field",
        value_name = "FIELD",
        help_heading = "Filter",
        help = "Field to filter on (defaults to the first column)."
    )]
    pub field: Option<String>,

    #[arg(
        long = "value",
        visible_alias = "filter-value",
        value_name = "VALUE",
        action = ArgAction::Append,
        help_heading = "Filter",
        help = "Keep records whose field equals this value (repeatable)."
    )]
    pub value: Vec<String>,

    #[arg(
        long = "none",
        help_heading = "Filter",
        conflicts_with = "value",
        help = "Select no values (matches nothing; useful to inspect the value list)."
    )]
    pub none: bool,

    #[arg(
        short = 's',
        long = "single-value",
        help_heading = "Filter",
        help = "Single-choice value selection instead of a multi-select."
    )]
    pub single_value: bool,

    #[arg(
        long = "from",
        value_name = "DATE",
        help_heading = "Filter",
        help = "Inclusive lower bound for createdAt/updatedAt (RFC 3339 or YYYY-MM-DD; a bare date means 00:00 UTC)."
    )]
    pub from: Option<String>,

    #[arg(
        long = "to",
        value_name = "DATE",
        help_heading = "Filter",
        help = "Inclusive upper bound for createdAt/updatedAt (RFC 3339 or YYYY-MM-DD; a bare date means 00:00 UTC)."
    )]
    pub to: Option<String>,

    #[arg(
        long = "list-values",
        help_heading = "Filter",
        help = "Print the distinct values of the filter field."
    )]
    pub list_values: bool,

    #[arg(
        short = 'P',
        long = "page",
        value_name = "N",
        help_heading = "Pagination",
        help = "Page to display (clamped to the last page)."
    )]
    pub page: Option<usize>,

    #[arg(
        short = 'S',
        long = "page-size",
        value_name = "N",
        help_heading = "Pagination",
        help = "Rows per page: 25, 50, 100, 250 or 500."
    )]
    pub page_size: Option<usize>,

    #[arg(
        long = "columns",
        value_name = "LIST",
        help_heading = "Output",
        help = "Comma-separated subset of columns to display (export always uses every column)."
    )]
    pub columns: Option<String>,

    #[arg(
        short = 'O',
        long = "output",
        value_name = "FILE",
        help_heading = "Output",
        help = "Write the filtered records to a file."
    )]
    pub output: Option<String>,

    #[arg(
        short = 'A',
        long = "output-format",
        value_name = "FORMAT",
        help_heading = "Output",
        help = "Output format (csv, json, text)."
    )]
    pub output_format: Option<String>,

    #[arg(
        short = 'x',
        long = "export",
        help_heading = "Output",
        help = "Export the filtered records to a timestamped CSV in the current directory."
    )]
    pub export: bool,

    #[arg(
        short = 'L',
        long = "contact-list",
        value_name = "NAME",
        help_heading = "Contacts",
        help = "Create a contact list from the filtered records' profile ids."
    )]
    pub contact_list: Option<String>,
}

use clap::arg;

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);

pub fn command_argument_builder() -> clap::Command {
    clap::Command::new("certgraph")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("certgraph")
        .about(
            "Discover related hosts by following the names in their TLS certificates, \
            breadth-first.",
        )
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress banner and progress output").required(false))
        .arg(
            arg!(-H --"host" <HOST>)
                .required(false)
                .help("Host to start from (a bare hostname or a URL)")
                .default_value("localhost")
                .conflicts_with("hosts-file"),
        )
        .arg(
            arg!(--"hosts-file" <PATH>)
                .required(false)
                .help("Path to a newline-delimited file of seed hosts, all walked together")
                .value_parser(clap::value_parser!(std::path::PathBuf))
                .conflicts_with("host"),
        )
        .arg(
            arg!(-p --"port" <PORT>)
                .required(false)
                .help("Port to connect to")
                .value_parser(clap::value_parser!(u16))
                .default_value("443"),
        )
        .arg(
            arg!(-t --"timeout" <SECONDS>)
                .required(false)
                .help("TCP/TLS timeout in seconds for each host")
                .value_parser(clap::value_parser!(u64))
                .default_value("5"),
        )
        .arg(
            arg!(-d --"depth" <DEPTH>)
                .required(false)
                .help("Maximum BFS depth to go")
                .value_parser(clap::value_parser!(usize))
                .default_value("20"),
        )
        .arg(
            arg!(-P --"parallel" <NUM_WORKERS>)
                .required(false)
                .help("Number of certificates to retrieve in parallel")
                .value_parser(clap::value_parser!(usize))
                .default_value("10"),
        )
        .arg(
            arg!(-v --"verbose" "Log skipped hosts, failures and a summary to stderr")
                .required(false),
        )
        .arg(
            arg!(-o --"output" <PATH>)
                .required(false)
                .help("Save report to file (default: print to stdout)"),
        )
        .arg(
            arg!(-f --"format" <FORMAT>)
                .required(false)
                .help("Report format: text, json, dot")
                .value_parser(["text", "json", "dot"])
                .default_value("text"),
        )
}

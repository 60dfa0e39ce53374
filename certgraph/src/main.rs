use certgraph::commands::command_argument_builder;
use certgraph::handlers::handle_walk;
use certgraph_core::print_banner;

#[tokio::main]
async fn main() {
    let cmd = command_argument_builder();
    let matches = cmd.get_matches();

    // Show banner unless --quiet flag is set
    if !matches.get_flag("quiet") {
        print_banner();
    }

    handle_walk(&matches).await;
}

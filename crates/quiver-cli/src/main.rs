//! # Quiver CLI
//!
//! Batch importer and query server for quiver graph artifacts.
//!
//! ## Usage
//!
//! ```bash
//! # Import an edge list into an artifact directory
//! quiver import edges.csv ./artifact
//!
//! # Serve analytic queries over the artifact
//! quiver serve ./artifact 8080
//! ```

mod server;

use std::path::Path;
use std::process::ExitCode;

use quiver_storage::{import, logging, ImportConfig};
use server::ServerConfig;

fn main() -> ExitCode {
    logging::init();

    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(|s| s.as_str()) {
        Some("import") => run_import(&args),
        Some("serve") => run_serve(&args),
        Some("--help") | Some("-h") => {
            print_help();
            ExitCode::SUCCESS
        }
        Some(other) => {
            eprintln!("unknown command: {other}\n");
            print_help();
            ExitCode::FAILURE
        }
        None => {
            print_help();
            ExitCode::FAILURE
        }
    }
}

fn print_help() {
    println!("quiver - read-mostly graph analytics engine\n");
    println!("USAGE:");
    println!("    quiver import <input.csv> <artifact-dir>");
    println!("    quiver serve <artifact-dir> [port]\n");
    println!("COMMANDS:");
    println!("    import    Two-pass CSV import producing a read-only artifact.");
    println!("              Input: header line, then records of the form");
    println!("              src_id,src_label,dst_id,dst_label,edge_label");
    println!("    serve     Memory-map an artifact and answer queries over HTTP:");
    println!("              POST /api/khop               {{\"node\": .., \"k\": ..}}");
    println!("              POST /api/common-neighbors   {{\"nodes\": [..]}}");
    println!("              POST /api/reachable          {{\"src\": .., \"dst\": ..}}");
    println!("              POST /api/subgraph           {{\"node_labels\": [..], \"edges\": [[a,b,label]..]}}");
    println!("              GET  /api/connected-components");
    println!("              GET  /health\n");
    println!("ENVIRONMENT:");
    println!("    QUIVER_LOG               log filter (default: info)");
    println!("    QUIVER_PORT              serve port when not given as an argument");
    println!("    QUIVER_IMPORT_BLOCKS     also build block artifacts (true/false)");
    println!("    QUIVER_IMPORT_MEMORY_MB  block-builder memory ceiling");
}

fn run_import(args: &[String]) -> ExitCode {
    let (Some(input), Some(dest)) = (args.get(2), args.get(3)) else {
        eprintln!("usage: quiver import <input.csv> <artifact-dir>");
        return ExitCode::FAILURE;
    };

    let config = ImportConfig::from_env();
    match import(Path::new(input), Path::new(dest), &config) {
        Ok(stats) => {
            println!(
                "imported {} nodes, {} edges ({} node labels, {} edge labels, {} lines skipped)",
                stats.num_nodes,
                stats.num_edges,
                stats.node_labels,
                stats.edge_labels,
                stats.skipped_lines
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("import failed: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run_serve(args: &[String]) -> ExitCode {
    let Some(artifact_dir) = args.get(2) else {
        eprintln!("usage: quiver serve <artifact-dir> [port]");
        return ExitCode::FAILURE;
    };

    let mut config = ServerConfig::from_env();
    if let Some(port_arg) = args.get(3) {
        match port_arg.parse() {
            Ok(port) => config.port = port,
            Err(_) => {
                eprintln!("invalid port: {port_arg}");
                return ExitCode::FAILURE;
            }
        }
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };
    match runtime.block_on(server::run_server(Path::new(artifact_dir), config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("server failed: {e}");
            ExitCode::FAILURE
        }
    }
}

//! Line-oriented control console
//!
//! Reads commands from stdin and prints JSON replies on stdout:
//!
//! - `route <output> <input>` - Set a virtual route by index
//! - `state` - Print the virtual route vector and both physical states
//! - `help` - List commands
//! - `quit` - Exit
//!
//! Every published virtual route vector is also printed as it arrives.

use std::io;

use av_mux::{MatrixSnapshot, RouteTickets, Router, VirtualState};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::watch;
use tracing::{info, warn};

const HELP: &str = "commands: route <output 0-15> <input 0-11> | state | help | quit";

/// One parsed console line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Route { output: String, input: String },
    State,
    Help,
    Quit,
}

/// Parse a console line; blank lines yield `None`
pub fn parse_command(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };

    let command = match verb.to_ascii_lowercase().as_str() {
        "route" => {
            let (Some(output), Some(input), None) = (words.next(), words.next(), words.next())
            else {
                return Err("usage: route <output> <input>".to_string());
            };
            ConsoleCommand::Route {
                output: output.to_string(),
                input: input.to_string(),
            }
        }
        "state" => ConsoleCommand::State,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" => ConsoleCommand::Quit,
        other => return Err(format!("unknown command {:?}", other)),
    };
    Ok(Some(command))
}

/// Reply to `state`
#[derive(Debug, Serialize)]
struct StateReport<'a> {
    virtual_state: &'a VirtualState,
    hdmi: MatrixSnapshot,
    component: MatrixSnapshot,
}

/// Serve the console on stdin until `quit` or end of input
pub async fn run_console(router: &Router) -> io::Result<()> {
    run_console_on(router, tokio::io::stdin()).await
}

/// Serve the console on any line source
pub async fn run_console_on<R>(router: &Router, input: R) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(input).lines();
    println!("{}", HELP);

    while let Some(line) = lines.next_line().await? {
        match parse_command(&line) {
            Ok(None) => {}
            Ok(Some(ConsoleCommand::Route { output, input })) => {
                match router.set_route_raw(&output, &input) {
                    Ok(tickets) => report_route(output, input, tickets),
                    Err(e) => println!("error: {}", e),
                }
            }
            Ok(Some(ConsoleCommand::State)) => print_state(router),
            Ok(Some(ConsoleCommand::Help)) => println!("{}", HELP),
            Ok(Some(ConsoleCommand::Quit)) => {
                info!("Console quit");
                break;
            }
            Err(e) => println!("error: {}", e),
        }
    }
    Ok(())
}

/// Log how a route's commands ended without blocking the console
fn report_route(output: String, input: String, tickets: RouteTickets) {
    tokio::spawn(async move {
        match tickets.wait().await {
            Ok(()) => info!("Route {} <- {} complete", output, input),
            Err(e) => warn!("Route {} <- {} failed: {}", output, input, e),
        }
    });
}

fn print_state(router: &Router) {
    let virtual_state = router.virtual_state();
    let report = StateReport {
        virtual_state: &virtual_state,
        hdmi: router.hdmi().snapshot(),
        component: router.component().snapshot(),
    };
    match serde_json::to_string(&report) {
        Ok(json) => println!("{}", json),
        Err(e) => warn!("Failed to encode state: {}", e),
    }
}

/// Print every published virtual route vector as a JSON line
pub fn spawn_state_printer(mut virtual_rx: watch::Receiver<VirtualState>) {
    tokio::spawn(async move {
        while virtual_rx.changed().await.is_ok() {
            let state = virtual_rx.borrow_and_update().clone();
            match serde_json::to_string(&state) {
                Ok(json) => println!("virtual_state {}", json),
                Err(e) => warn!("Failed to encode state: {}", e),
            }
        }
    });
}

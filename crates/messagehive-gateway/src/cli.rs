//! Command line surface.

use clap::{Parser, Subcommand};

use crate::config::GatewayConfig;

#[derive(Parser, Debug)]
#[command(name = "messagehive")]
#[command(author, version, about = "An expressive, fast message gateway", long_about = None)]
pub struct Args {
    /// Config file (YAML)
    #[arg(short, long, default_value = "messagehive.yaml")]
    pub config: String,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the MessageHive server
    Server {
        /// Port on which the server will listen
        #[arg(short, long)]
        port: Option<u16>,

        /// Interface to which the server will bind
        #[arg(long)]
        bind: Option<String>,
    },
}

impl Args {
    /// Flags win over the file.
    pub fn apply_overrides(&self, cfg: &mut GatewayConfig) {
        if let Some(level) = &self.log_level {
            cfg.log.level = level.clone();
        }
        if let Some(Command::Server { port, bind }) = &self.command {
            if let Some(port) = port {
                cfg.gateway.port = *port;
            }
            if let Some(bind) = bind {
                cfg.gateway.bind = bind.clone();
            }
        }
    }
}

use std::fmt;
use std::net::{AddrParseError, SocketAddr};
use std::str::FromStr;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::core::contact::Contact;
use crate::core::identifier::KademliaId;
use crate::dht::KademliaDht;
use crate::error::DhtError;
use crate::protocol::RpcClient;

const PROMPT: &str = ">>> ";
const HEX_ID_LEN: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Get(KademliaId),
    Put(String),
    Lookup(KademliaId),
    Join { id: KademliaId, address: SocketAddr },
    Print,
    Exit,
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("error: No argument provided for {0}")]
    MissingArgument(&'static str),

    #[error("error: Invalid Kademlia ID length")]
    IdLength,

    #[error("error: {0}")]
    Identifier(#[from] DhtError),

    #[error("error: invalid address: {0}")]
    Address(#[from] AddrParseError),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("Error: Unknown command.")]
    Unknown(String),
}

fn parse_id(command: &'static str, arg: &str) -> Result<KademliaId, ParseError> {
    if arg.is_empty() {
        return Err(ParseError::MissingArgument(command));
    }
    if arg.len() != HEX_ID_LEN {
        return Err(ParseError::IdLength);
    }
    Ok(KademliaId::from_hex(arg)?)
}

impl FromStr for ConsoleCommand {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (command, arg) = match line.split_once(char::is_whitespace) {
            Some((command, arg)) => (command, arg.trim()),
            None => (line, ""),
        };

        match command.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get(parse_id("GET", arg)?)),
            "PUT" if arg.is_empty() => Err(ParseError::MissingArgument("PUT")),
            "PUT" => Ok(Self::Put(arg.to_string())),
            "LOOKUP" => Ok(Self::Lookup(parse_id("LOOKUP", arg)?)),
            "JOIN" => {
                let mut parts = arg.split_whitespace();
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(id), Some(address), None) => Ok(Self::Join {
                        id: parse_id("JOIN", id)?,
                        address: address.parse()?,
                    }),
                    _ => Err(ParseError::Usage("JOIN <NodeID> <Node Address>")),
                }
            }
            "PRINT" => Ok(Self::Print),
            "EXIT" => Ok(Self::Exit),
            _ => Err(ParseError::Unknown(command.to_string())),
        }
    }
}

struct Listed<'a>(&'a Contact);

impl fmt::Display for Listed<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.0.id, self.0.address)
    }
}

/// Line-oriented operator console over any async reader/writer pair.
pub struct Console<R: RpcClient, W> {
    dht: KademliaDht<R>,
    output: W,
}

impl<R: RpcClient, W: AsyncWrite + Unpin> Console<R, W> {
    pub fn new(dht: KademliaDht<R>, output: W) -> Self {
        Self { dht, output }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    /// Read and execute commands until EXIT or end of input.
    pub async fn run<I: AsyncBufRead + Unpin>(&mut self, input: I) -> Result<(), DhtError> {
        let mut lines = input.lines();
        loop {
            self.output.write_all(PROMPT.as_bytes()).await?;
            self.output.flush().await?;
            let Some(line) = lines.next_line().await? else {
                return Ok(());
            };
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<ConsoleCommand>() {
                Ok(command) => {
                    if !self.execute(command).await? {
                        return Ok(());
                    }
                }
                Err(e) => self.say(e).await?,
            }
        }
    }

    /// Run one command. Returns false once the console should stop.
    ///
    /// Only a dead node actor is an error here; everything else is reported
    /// to the operator.
    pub async fn execute(&mut self, command: ConsoleCommand) -> Result<bool, DhtError> {
        debug!(?command, "Console command");
        let result = match command {
            ConsoleCommand::Get(key) => self.get(key).await,
            ConsoleCommand::Put(data) => self.put(data).await,
            ConsoleCommand::Lookup(target) => self.lookup(target).await,
            ConsoleCommand::Join { id, address } => self.join(Contact::new(id, address)).await,
            ConsoleCommand::Print => self.print().await,
            ConsoleCommand::Exit => {
                self.say("Exiting program.").await?;
                return Ok(false);
            }
        };
        match result {
            Ok(()) => Ok(true),
            Err(DhtError::ChannelClosed) => Err(DhtError::ChannelClosed),
            Err(DhtError::Io(e)) => Err(DhtError::Io(e)),
            Err(e) => {
                self.say(format!("error: {e}")).await?;
                Ok(true)
            }
        }
    }

    async fn get(&mut self, key: KademliaId) -> Result<(), DhtError> {
        let outcome = self.dht.get(key).await?;
        match (outcome.value, outcome.found_on) {
            (Some(value), Some(holder)) => {
                self.say(format!("Data found on contact: {}", Listed(&holder)))
                    .await?;
                self.say(format!("Data: {}", String::from_utf8_lossy(&value)))
                    .await
            }
            _ => self.say("Data not found.").await,
        }
    }

    async fn put(&mut self, data: String) -> Result<(), DhtError> {
        let receipt = self.dht.store(data.into_bytes()).await?;
        if receipt.is_success() {
            self.say(format!("Data stored successfully. Hash: {}", receipt.key))
                .await
        } else {
            self.say("Failed to store data.").await
        }
    }

    async fn lookup(&mut self, target: KademliaId) -> Result<(), DhtError> {
        match self.dht.lookup_contact(target).await {
            Ok(contacts) => {
                for contact in &contacts {
                    self.say(Listed(contact)).await?;
                }
                Ok(())
            }
            Err(DhtError::NoContactsFound(_)) => self.say("No contacts found.").await,
            Err(e) => Err(e),
        }
    }

    async fn join(&mut self, seed: Contact) -> Result<(), DhtError> {
        let learned = self.dht.bootstrap(seed).await?;
        self.say(format!("Joined network; {} contacts nearby.", learned.len()))
            .await
    }

    async fn print(&mut self) -> Result<(), DhtError> {
        let buckets = self.dht.dump_routing_table().await?;
        if buckets.is_empty() {
            return self.say("Routing table is empty.").await;
        }
        for bucket in buckets {
            self.say(format!("Bucket {}:", bucket.index)).await?;
            for contact in &bucket.contacts {
                self.say(format!("  {}", Listed(contact))).await?;
            }
        }
        Ok(())
    }

    async fn say<T: fmt::Display>(&mut self, line: T) -> Result<(), DhtError> {
        let line = format!("{line}\n");
        self.output.write_all(line.as_bytes()).await?;
        Ok(())
    }
}

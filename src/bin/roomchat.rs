//! roomchat - interactive line client for the roomchat daemon
//!
//! Prints everything the server sends and forwards each stdin line.
//!
//! # Usage
//!
//! ```text
//! roomchat                    # connect to 127.0.0.1:8080
//! roomchat chat.example:9000  # connect elsewhere
//! ```
//!
//! The client exits after sending `/quit`, on end of input, or when the
//! server closes the connection.

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{
    self, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::net::TcpStream;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// roomchat - multi-room chat client
#[derive(Parser, Debug)]
#[command(name = "roomchat", version, about)]
struct Args {
    /// Server address
    #[arg(default_value = "127.0.0.1:8080")]
    addr: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so they never mix with chat output
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let stream = TcpStream::connect(&args.addr)
        .await
        .with_context(|| format!("Failed to connect to {}", args.addr))?;
    debug!(addr = %args.addr, "Connected");

    let (mut reader, mut writer) = stream.into_split();
    let mut stdin = BufReader::new(io::stdin()).lines();
    let mut stdout = io::stdout();
    let mut buf = vec![0u8; 4096];

    loop {
        tokio::select! {
            read = reader.read(&mut buf) => {
                let n = read.context("Failed to read from server")?;
                if n == 0 {
                    debug!("Server closed the connection");
                    break;
                }
                stdout.write_all(&buf[..n]).await?;
                stdout.flush().await?;
            }

            line = stdin.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    debug!("End of input");
                    break;
                };
                writer.write_all(line.as_bytes()).await?;
                writer.write_all(b"\n").await?;

                if line.trim() == "/quit" {
                    // Print the farewell before leaving
                    drain_server(&mut reader, &mut stdout, &mut buf).await?;
                    break;
                }
            }
        }
    }

    let _ = writer.shutdown().await;
    Ok(())
}

/// Copies remaining server output until the server closes the connection.
async fn drain_server<R, W>(reader: &mut R, out: &mut W, buf: &mut [u8]) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        let n = reader.read(buf).await.context("Failed to read from server")?;
        if n == 0 {
            return Ok(());
        }
        out.write_all(&buf[..n]).await?;
        out.flush().await?;
    }
}

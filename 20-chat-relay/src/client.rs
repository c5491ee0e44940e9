use anyhow::{Context, Result};
use tokio::{
    io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    select,
};
use tracing::{info, warn};

use crate::{
    cli::ClientArgs,
    protocol::{self, write_line},
};

pub async fn run(args: ClientArgs) -> Result<()> {
    let (mut server, mut writer) = establish_connection(&args).await?;
    let mut stdin = BufReader::new(io::stdin()).lines();
    let mut pending_name = args.name;

    run_client_loop(&mut server, &mut writer, &mut stdin, &mut pending_name).await?;
    shutdown_connection(&mut writer).await;

    Ok(())
}

async fn establish_connection(
    args: &ClientArgs,
) -> Result<(Lines<BufReader<OwnedReadHalf>>, OwnedWriteHalf)> {
    let stream = TcpStream::connect(args.server)
        .await
        .with_context(|| format!("failed to connect to {}", args.server))?;

    info!("connected to {}", args.server);

    let (reader, writer) = stream.into_split();
    Ok((BufReader::new(reader).lines(), writer))
}

// `Lines::next_line` is cancel safe, so neither side loses a partial line
// when the other branch of the select wins.
async fn run_client_loop(
    server: &mut Lines<BufReader<OwnedReadHalf>>,
    writer: &mut OwnedWriteHalf,
    stdin: &mut Lines<BufReader<Stdin>>,
    pending_name: &mut Option<String>,
) -> Result<()> {
    loop {
        select! {
            server_line = server.next_line() => {
                if !handle_server_line(server_line, writer, pending_name).await? {
                    break;
                }
            }
            input = stdin.next_line() => {
                if !handle_stdin_input(input, writer).await? {
                    break;
                }
            }
            ctrl_c = tokio::signal::ctrl_c() => {
                if let Err(error) = ctrl_c {
                    warn!(?error, "ctrl-c handler failed");
                }
                say_bye(writer).await;
                break;
            }
        }
    }
    Ok(())
}

async fn handle_server_line(
    line: io::Result<Option<String>>,
    writer: &mut OwnedWriteHalf,
    pending_name: &mut Option<String>,
) -> Result<bool> {
    let Some(line) = line? else {
        write_stdout("*** server closed the connection").await?;
        return Ok(false);
    };

    write_stdout(&line).await?;

    if line == protocol::NAME_PROMPT {
        if let Some(name) = pending_name.take() {
            write_line(writer, &name).await?;
        }
    }
    Ok(true)
}

async fn handle_stdin_input(
    input: io::Result<Option<String>>,
    writer: &mut OwnedWriteHalf,
) -> Result<bool> {
    let Some(input) = input? else {
        say_bye(writer).await;
        return Ok(false);
    };

    let text = input.trim();
    if text.is_empty() {
        return Ok(true);
    }

    if protocol::is_exit(text) {
        say_bye(writer).await;
        return Ok(false);
    }

    write_line(writer, text).await?;
    Ok(true)
}

async fn say_bye(writer: &mut OwnedWriteHalf) {
    if let Err(error) = write_line(writer, protocol::EXIT_KEYWORD).await {
        warn!(?error, "failed to say bye");
    }
}

async fn shutdown_connection(writer: &mut OwnedWriteHalf) {
    if let Err(error) = writer.shutdown().await {
        warn!(?error, "failed to shutdown client writer cleanly");
    }
}

async fn write_stdout(line: &str) -> io::Result<()> {
    let mut stdout = io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}

use std::{path::Path, process::Stdio, time::Duration};

use anyhow::{Context, Result, anyhow};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    process::{Child, ChildStdin, ChildStdout, Command},
    time::timeout,
};

const READ_TIMEOUT: Duration = Duration::from_secs(3);

#[tokio::test]
async fn cli_chat_end_to_end() -> Result<()> {
    let binary = assert_cmd::cargo::cargo_bin!("chat_relay");

    let (mut server_child, mut server_stdout) = spawn_server(&binary).await?;
    let addr = read_server_addr(&mut server_stdout).await?;

    // Keep draining relay logs so the pipe never fills.
    let server_log_task = tokio::spawn(async move {
        drain_stdout(server_stdout).await;
    });

    let mut alice = spawn_client(&binary, "alice", &addr).await?;
    let mut bob = spawn_client(&binary, "bob", &addr).await?;

    let alice_sees_bob =
        read_line_expect(&mut alice.stdout, "waiting for alice join notice").await?;
    assert_eq!(alice_sees_bob, "bob has joined the chat");

    alice
        .send_line("Hello from Alice")
        .await
        .context("alice send line")?;
    let bob_hears_alice =
        read_line_expect(&mut bob.stdout, "waiting for bob to hear alice").await?;
    assert_eq!(bob_hears_alice, "alice: Hello from Alice");

    bob.send_line("Hi Alice!").await.context("bob send line")?;
    let alice_hears_bob =
        read_line_expect(&mut alice.stdout, "waiting for alice to hear bob").await?;
    assert_eq!(alice_hears_bob, "bob: Hi Alice!");

    // Bob leaves with the exit keyword; Alice is told.
    bob.send_line("bye").await.context("bob send bye")?;
    let alice_sees_departure =
        read_line_expect(&mut alice.stdout, "waiting for alice to see bob leave").await?;
    assert_eq!(alice_sees_departure, "bob has left the chat");
    ensure_success(&mut bob.child, "bob client").await?;

    // Closing stdin makes the client say bye on its own.
    drop(alice.stdin);
    ensure_success(&mut alice.child, "alice client").await?;

    // The relay has no shutdown path; terminate it manually.
    let _ = server_child.kill().await;
    let _ = server_child.wait().await;
    let _ = server_log_task.await;

    Ok(())
}

struct ClientProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl ClientProcess {
    async fn send_line(&mut self, line: &str) -> Result<()> {
        self.stdin
            .write_all(line.as_bytes())
            .await
            .with_context(|| format!("failed to send line '{line}'"))?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;
        Ok(())
    }
}

async fn spawn_server(binary: &Path) -> Result<(Child, BufReader<ChildStdout>)> {
    let mut cmd = Command::new(binary);
    cmd.arg("server")
        .arg("--listen")
        .arg("127.0.0.1:0")
        .env("RUST_LOG", "info")
        .env("NO_COLOR", "1")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let mut child = cmd.spawn().context("failed to spawn relay")?;
    let stdout = child
        .stdout
        .take()
        .context("relay stdout missing after spawn")?;

    Ok((child, BufReader::new(stdout)))
}

async fn read_server_addr(reader: &mut BufReader<ChildStdout>) -> Result<String> {
    let line = read_line(reader)
        .await?
        .context("relay did not emit listening address")?;
    let trimmed = line.trim();
    let addr = trimmed
        .split_whitespace()
        .last()
        .context("unexpected relay banner format")?;
    if !addr.contains(':') {
        return Err(anyhow!("relay banner missing socket: {trimmed}"));
    }
    Ok(addr.to_string())
}

async fn spawn_client(binary: &Path, name: &str, addr: &str) -> Result<ClientProcess> {
    let mut cmd = Command::new(binary);
    cmd.arg("client")
        .arg("--name")
        .arg(name)
        .arg("--server")
        .arg(addr)
        .env("RUST_LOG", "warn")
        .env("NO_COLOR", "1")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("failed to spawn client {name}"))?;

    let stdin = child
        .stdin
        .take()
        .context("client stdin missing after spawn")?;
    let stdout = child
        .stdout
        .take()
        .context("client stdout missing after spawn")?;

    let mut process = ClientProcess {
        child,
        stdin,
        stdout: BufReader::new(stdout),
    };

    let prompt = read_line_expect(&mut process.stdout, "waiting for name prompt").await?;
    if prompt != "Please enter your name:" {
        return Err(anyhow!("expected name prompt for {name}, got '{prompt}'"));
    }
    let welcome = read_line_expect(&mut process.stdout, "waiting for welcome banner").await?;
    if welcome != format!("Welcome {name} to the chat room!") {
        return Err(anyhow!("expected welcome banner for {name}, got '{welcome}'"));
    }

    Ok(process)
}

async fn read_line_expect(
    reader: &mut BufReader<ChildStdout>,
    description: &str,
) -> Result<String> {
    match read_line(reader).await {
        Ok(Some(line)) => Ok(line),
        Ok(None) => Err(anyhow!("{description}: stream closed")),
        Err(err) => Err(err.context(format!("{description}: failed to read line"))),
    }
}

async fn read_line(reader: &mut BufReader<ChildStdout>) -> Result<Option<String>> {
    let mut line = String::new();
    let bytes = match timeout(READ_TIMEOUT, reader.read_line(&mut line)).await {
        Ok(result) => result?,
        Err(_) => return Err(anyhow!("timed out waiting for line")),
    };
    if bytes == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

async fn drain_stdout(mut reader: BufReader<ChildStdout>) {
    let mut buffer = String::new();
    while matches!(reader.read_line(&mut buffer).await, Ok(bytes) if bytes > 0) {
        buffer.clear();
    }
}

async fn ensure_success(child: &mut Child, name: &str) -> Result<()> {
    let status = timeout(READ_TIMEOUT, child.wait())
        .await
        .map_err(|_| anyhow!("{name} did not exit in time"))?
        .with_context(|| format!("failed to await {name} process"))?;
    if !status.success() {
        return Err(anyhow!("{name} exited with status {status}"));
    }
    Ok(())
}

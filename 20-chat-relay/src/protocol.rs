use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Keyword a client sends to leave the chat. Matched case-insensitively.
pub const EXIT_KEYWORD: &str = "bye";

pub const NAME_PROMPT: &str = "Please enter your name:";
pub const NAME_REJECTED: &str =
    "Username already taken or invalid. Please choose another name:";

const LINE_ENDINGS: &[char] = &['\n', '\r'];

pub fn welcome(name: &str) -> String {
    format!("Welcome {name} to the chat room!")
}

pub fn joined(name: &str) -> String {
    format!("{name} has joined the chat")
}

pub fn left(name: &str) -> String {
    format!("{name} has left the chat")
}

pub fn chat(name: &str, text: &str) -> String {
    format!("{name}: {text}")
}

pub fn is_exit(line: &str) -> bool {
    line.eq_ignore_ascii_case(EXIT_KEYWORD)
}

/// Reads one newline-delimited line, without its line ending.
///
/// Returns `Ok(None)` once the peer has closed the stream and nothing is
/// buffered. A trailing line without a newline is still returned. Lines
/// longer than `max_len` bytes and non UTF-8 input are reported as
/// [`io::ErrorKind::InvalidData`].
pub async fn read_line<R>(reader: &mut R, max_len: usize) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    // Room for the payload plus "\r\n".
    let limit = max_len as u64 + 2;
    let mut buf = Vec::new();
    let bytes = (&mut *reader).take(limit).read_until(b'\n', &mut buf).await?;
    if bytes == 0 {
        return Ok(None);
    }

    let terminated = buf.last() == Some(&b'\n');
    let line = String::from_utf8(buf)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
    let line = line.trim_end_matches(LINE_ENDINGS);

    if line.len() > max_len || (!terminated && bytes as u64 == limit) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("line exceeds {max_len} bytes"),
        ));
    }

    Ok(Some(line.to_string()))
}

pub async fn write_line<W>(writer: &mut W, line: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut encoded = Vec::with_capacity(line.len() + 1);
    encoded.extend_from_slice(line.as_bytes());
    encoded.push(b'\n');
    writer.write_all(&encoded).await?;
    writer.flush().await
}

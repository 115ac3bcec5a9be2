use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// Reads `reader` to the end, calling `on_line` for each line without its terminator.
/// Invalid UTF-8 is replaced rather than rejected.
pub async fn for_each_line<R, F>(reader: R, mut on_line: F) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    F: FnMut(String),
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(());
        }
        let line = String::from_utf8_lossy(&buf);
        on_line(line.trim_end_matches(['\n', '\r']).to_string());
    }
}

pub async fn collect_lines<R: AsyncRead + Unpin>(reader: R) -> Vec<String> {
    let mut lines = Vec::new();
    if let Err(e) = for_each_line(reader, |line| lines.push(line)).await {
        tracing::warn!("Failed reading script output: {}", e);
    }
    lines
}

/// Relays each line at INFO level prefixed with `tag`.
pub async fn relay_lines<R: AsyncRead + Unpin>(reader: R, tag: String) {
    let result = for_each_line(reader, |line| tracing::info!("{} {}", tag, line)).await;
    if let Err(e) = result {
        tracing::warn!("{} failed reading script stderr: {}", tag, e);
    }
}

use crate::cli::{default_file_name, DownloadArgs};
use crate::core::model::TransferRequest;
use anyhow::Context;
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Asks for whatever the command line left out and builds the request.
pub async fn complete_request<R, W>(
    input: &mut R,
    output: &mut W,
    args: &DownloadArgs,
) -> anyhow::Result<TransferRequest>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let url = match &args.url {
        Some(u) => u.clone(),
        None => ask(input, output, "Url: ").await?,
    };
    if url.is_empty() {
        anyhow::bail!("no url given");
    }

    let target = match &args.output {
        Some(p) => p.clone(),
        None => {
            let suggested = default_file_name(&url);
            let answer = ask(input, output, &format!("Filename [{}]: ", suggested)).await?;
            PathBuf::from(if answer.is_empty() { suggested } else { answer })
        }
    };

    let segments = match args.segments {
        Some(n) => n,
        None => {
            let answer = ask(input, output, "Total sections: ").await?;
            answer
                .parse::<u64>()
                .with_context(|| format!("invalid section count {:?}", answer))?
        }
    };

    Ok(TransferRequest { url, target, segments })
}

async fn ask<R, W>(input: &mut R, output: &mut W, question: &str) -> anyhow::Result<String>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    output.write_all(question.as_bytes()).await?;
    output.flush().await?;
    let mut line = String::new();
    input.read_line(&mut line).await.context("read answer")?;
    Ok(line.trim().to_string())
}

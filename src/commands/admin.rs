use super::{echo_text, lowercase_debug, AppContext};
use crate::api::admin;
use crate::api::upload::{format_file_size, ChunkedUploader, UploadSource, UploadStatus};
use crate::error::{AppError, AppResult};
use std::io::Write;
use std::path::PathBuf;
use tracing::{error, info};

/// Upload each file in turn. A failed file does not stop the rest; the
/// command fails if any of them did.
pub async fn upload(ctx: &AppContext, out: &mut impl Write, paths: &[PathBuf]) -> AppResult<()> {
    ctx.resolved_session().await?.require_admin()?;
    let uploader = ChunkedUploader::new(&ctx.transport, ctx.config.upload.clone());

    let mut failed = 0usize;
    for path in paths {
        let result = match UploadSource::from_path(path).await {
            Ok(source) => {
                uploader
                    .upload(&source, |p| match p.status {
                        UploadStatus::Uploading => info!(
                            file = %path.display(),
                            chunk = p.chunks_uploaded,
                            total = p.total_chunks,
                            progress = p.progress,
                            "Uploading"
                        ),
                        UploadStatus::Processing => info!(file = %path.display(), "Processing"),
                        _ => {}
                    })
                    .await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(doc) => writeln!(
                out,
                "Uploaded {} ({}) as document {}",
                doc.file_name,
                format_file_size(doc.size),
                doc.id
            )?,
            Err(e) => {
                error!(file = %path.display(), error = %e, "Upload failed");
                writeln!(out, "Failed {}: {}", path.display(), e)?;
                failed += 1;
            }
        }
    }

    if failed > 0 {
        return Err(AppError::Invalid(format!(
            "{} of {} upload(s) failed",
            failed,
            paths.len()
        )));
    }
    Ok(())
}

pub async fn list_documents(ctx: &AppContext, out: &mut impl Write) -> AppResult<()> {
    ctx.resolved_session().await?.require_admin()?;
    for doc in admin::list_documents(&ctx.transport).await? {
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}",
            doc.id,
            doc.file_name,
            format_file_size(doc.size),
            lowercase_debug(&doc.status),
            doc.created_at
        )?;
    }
    Ok(())
}

pub async fn train_website(ctx: &AppContext, out: &mut impl Write, url: &str) -> AppResult<()> {
    ctx.resolved_session().await?.require_admin()?;
    let job = admin::train_website(&ctx.transport, url).await?;
    writeln!(
        out,
        "Queued {} (job {}, {})",
        job.url,
        job.id,
        lowercase_debug(&job.status)
    )?;
    Ok(())
}

pub async fn list_websites(ctx: &AppContext, out: &mut impl Write) -> AppResult<()> {
    ctx.resolved_session().await?.require_admin()?;
    for job in admin::list_websites(&ctx.transport).await? {
        write!(
            out,
            "{}\t{}\t{}\t{}/{} pages",
            job.id,
            job.url,
            lowercase_debug(&job.status),
            job.pages_processed,
            job.pages_found
        )?;
        if let Some(err) = &job.error {
            write!(out, "\t{}", err)?;
        }
        writeln!(out)?;
    }
    Ok(())
}

pub async fn list_users(ctx: &AppContext, out: &mut impl Write) -> AppResult<()> {
    ctx.resolved_session().await?.require_admin()?;
    for user in admin::list_users(&ctx.transport).await? {
        writeln!(
            out,
            "{}\t{} <{}>\t{} conversations\t{} messages",
            user.user_id, user.name, user.email, user.total_conversations, user.total_messages
        )?;
    }
    Ok(())
}

/// All conversations, or the messages of one when `conversation_id` is given.
pub async fn list_conversations(
    ctx: &AppContext,
    out: &mut impl Write,
    conversation_id: Option<&str>,
) -> AppResult<()> {
    ctx.resolved_session().await?.require_admin()?;
    if let Some(id) = conversation_id {
        for message in admin::conversation_messages(&ctx.transport, id).await? {
            writeln!(
                out,
                "[{}] {}",
                lowercase_debug(&message.sender),
                message.content
            )?;
        }
        return Ok(());
    }
    for conv in admin::list_conversations(&ctx.transport).await? {
        writeln!(
            out,
            "{}\t{}\t{}\t{} messages",
            conv.conversation_id,
            conv.title.as_deref().unwrap_or("New Chat"),
            conv.user_name,
            conv.total_messages
        )?;
    }
    Ok(())
}

pub async fn stats(ctx: &AppContext, out: &mut impl Write) -> AppResult<()> {
    ctx.resolved_session().await?.require_admin()?;
    let stats = admin::dashboard_stats(&ctx.transport).await?;
    writeln!(out, "users:         {}", stats.users)?;
    writeln!(out, "conversations: {}", stats.conversations)?;
    writeln!(out, "messages:      {}", stats.messages)?;
    writeln!(out, "sources:       {}", stats.sources)?;
    Ok(())
}

/// Ask the playground a single question; nothing is stored.
pub async fn playground<W: Write + Send>(
    ctx: &AppContext,
    out: &mut W,
    message: &str,
) -> AppResult<()> {
    ctx.resolved_session().await?.require_admin()?;
    admin::playground_chat(&ctx.transport, message, &[], echo_text(out)).await?;
    writeln!(out)?;
    Ok(())
}

//! Phase 1: byte transfer
//!
//! Payloads no larger than one chunk go in a single raw request whose body
//! is streamed from the staged file. Larger payloads open a resumable
//! session and send fixed-size chunks; the last chunk carries the
//! `finalize` command and its response body is the transfer token.
//!
//! ## Wire format
//!
//! | Step      | Request                                   | Headers |
//! |-----------|-------------------------------------------|---------|
//! | raw       | `POST {base}/v1/uploads`, body = bytes    | `X-Upload-Protocol: raw`, `X-Upload-Content-Type`, `X-Upload-File-Name` |
//! | start     | `POST {base}/v1/uploads`, empty body      | `X-Upload-Protocol: resumable`, `X-Upload-Command: start`, `X-Upload-Raw-Size` |
//! | chunk     | `POST {upload_url}`, body = chunk         | `X-Upload-Command: upload` or `upload, finalize`, `X-Upload-Offset` |
//!
//! The start response carries the session URL in `X-Upload-URL`.

use std::io::SeekFrom;

use reqwest::{Body, Method};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use mediapush_core::domain::TransferToken;
use mediapush_core::ports::{RemoteError, TransferSession, UploadRequest};

use crate::client::RemoteClient;
use crate::rate_limit::Endpoint;

/// Phase 1 endpoint, relative to the base URL
pub const UPLOADS_PATH: &str = "/v1/uploads";

pub const HEADER_PROTOCOL: &str = "X-Upload-Protocol";
pub const HEADER_COMMAND: &str = "X-Upload-Command";
pub const HEADER_CONTENT_TYPE: &str = "X-Upload-Content-Type";
pub const HEADER_FILE_NAME: &str = "X-Upload-File-Name";
pub const HEADER_RAW_SIZE: &str = "X-Upload-Raw-Size";
pub const HEADER_OFFSET: &str = "X-Upload-Offset";
pub const HEADER_UPLOAD_URL: &str = "X-Upload-URL";

fn local_io(path: &std::path::Path, err: std::io::Error) -> RemoteError {
    // A staged file vanishing mid-transfer is retried like a dropped connection
    RemoteError::Network(format!("reading {}: {}", path.display(), err))
}

/// Turns a phase-1 response body into a transfer token
async fn token_from_response(response: reqwest::Response) -> Result<TransferToken, RemoteError> {
    let body = response
        .text()
        .await
        .map_err(crate::client::map_transport_error)?;
    TransferToken::new(body).map_err(|e| RemoteError::Server {
        status: 200,
        message: format!("upload response carried no transfer token: {e}"),
    })
}

/// Sends the whole file in one request
pub async fn upload_raw(
    client: &RemoteClient,
    access_token: &str,
    request: &UploadRequest,
) -> Result<TransferToken, RemoteError> {
    debug!(
        file_name = %request.file_name,
        size_bytes = request.size_bytes,
        "Uploading in a single request"
    );

    let file = File::open(&request.path)
        .await
        .map_err(|e| local_io(&request.path, e))?;
    let body = Body::wrap_stream(ReaderStream::new(file));

    let builder = client
        .request(Method::POST, UPLOADS_PATH, access_token)
        .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
        .header(HEADER_PROTOCOL, "raw")
        .header(HEADER_CONTENT_TYPE, &request.mime_type)
        .header(HEADER_FILE_NAME, &request.file_name)
        .body(body);

    let response = client.send(builder, Endpoint::Upload).await?;
    token_from_response(response).await
}

/// Opens a resumable session and returns its URL
pub async fn start_resumable(
    client: &RemoteClient,
    access_token: &str,
    request: &UploadRequest,
) -> Result<String, RemoteError> {
    let builder = client
        .request(Method::POST, UPLOADS_PATH, access_token)
        .header(reqwest::header::CONTENT_LENGTH, 0)
        .header(HEADER_PROTOCOL, "resumable")
        .header(HEADER_COMMAND, "start")
        .header(HEADER_CONTENT_TYPE, &request.mime_type)
        .header(HEADER_FILE_NAME, &request.file_name)
        .header(HEADER_RAW_SIZE, request.size_bytes);

    let response = client.send(builder, Endpoint::Upload).await?;
    let url = response
        .headers()
        .get(HEADER_UPLOAD_URL)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| RemoteError::Server {
            status: response.status().as_u16(),
            message: "resumable start response had no upload URL".to_string(),
        })?;

    debug!(file_name = %request.file_name, "Resumable upload session opened");
    Ok(url)
}

/// Sends one chunk at `offset`; returns the token when `finalize` is set
pub async fn upload_chunk(
    client: &RemoteClient,
    access_token: &str,
    upload_url: &str,
    data: Vec<u8>,
    offset: u64,
    finalize: bool,
) -> Result<Option<TransferToken>, RemoteError> {
    let command = if finalize { "upload, finalize" } else { "upload" };
    debug!(offset, len = data.len(), finalize, "Uploading chunk");

    let builder = client
        .request_url(Method::POST, upload_url, access_token)
        .header(HEADER_COMMAND, command)
        .header(HEADER_OFFSET, offset)
        .body(data);

    let response = client.send(builder, Endpoint::Upload).await?;
    if finalize {
        token_from_response(response).await.map(Some)
    } else {
        Ok(None)
    }
}

/// Chunked transfer driven by `session`
///
/// Continues from `session.cursor` when the session already holds an upload
/// URL, so a retried phase does not resend acknowledged chunks.
pub async fn upload_resumable(
    client: &RemoteClient,
    access_token: &str,
    request: &UploadRequest,
    session: &mut TransferSession,
) -> Result<TransferToken, RemoteError> {
    let upload_url = match session.upload_url.clone() {
        Some(url) => {
            debug!(cursor = session.cursor, "Continuing resumable upload");
            url
        }
        None => {
            let url = start_resumable(client, access_token, request).await?;
            session.upload_url = Some(url.clone());
            session.cursor = 0;
            url
        }
    };

    let chunk_size = session.chunk_size.max(1);
    let total = request.size_bytes;
    let mut file = File::open(&request.path)
        .await
        .map_err(|e| local_io(&request.path, e))?;
    file.seek(SeekFrom::Start(session.cursor))
        .await
        .map_err(|e| local_io(&request.path, e))?;

    info!(
        file_name = %request.file_name,
        total,
        chunk_size,
        chunks = total.div_ceil(chunk_size),
        "Starting chunked upload"
    );

    loop {
        let remaining = total.saturating_sub(session.cursor);
        let len = remaining.min(chunk_size);
        let finalize = remaining <= chunk_size;

        let mut data = vec![0u8; len as usize];
        file.read_exact(&mut data)
            .await
            .map_err(|e| local_io(&request.path, e))?;

        let token = upload_chunk(
            client,
            access_token,
            &upload_url,
            data,
            session.cursor,
            finalize,
        )
        .await?;
        session.cursor += len;

        if let Some(token) = token {
            info!(file_name = %request.file_name, total, "Chunked upload finalized");
            return Ok(token);
        }
    }
}

/// Phase 1 entry point: picks raw or resumable by size
pub async fn upload_file(
    client: &RemoteClient,
    access_token: &str,
    request: &UploadRequest,
    session: &mut TransferSession,
) -> Result<TransferToken, RemoteError> {
    if session.chunk_size == 0 {
        session.chunk_size = request.chunk_size;
    }

    let token = if request.fits_single_request() {
        let token = upload_raw(client, access_token, request).await?;
        session.cursor = request.size_bytes;
        token
    } else {
        upload_resumable(client, access_token, request, session).await?
    };

    session.token = Some(token.clone());
    Ok(token)
}

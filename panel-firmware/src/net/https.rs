// HTTPS Transport für den Pull-Pfad
//
// reqwless über embassy-net (TcpClient + DnsSocket) mit embedded-tls.
// Zertifikate werden nicht geprüft, die Integrität des Images sichert
// die Partition-Signatur.

use defmt::{debug, warn};
use embassy_net::dns::DnsSocket;
use embassy_net::tcp::client::TcpClient;
use embassy_time::with_timeout;
use embedded_io_async::Read;
use panel_core::types::{ProbeResponse, Url};
use panel_core::{FirmwareTransport, ImageSink, TransportError, UpdateError};
use reqwless::client::{HttpClient, TlsConfig, TlsVerify};
use reqwless::request::{Method, RequestBuilder};
use reqwless::response::Response;

use crate::config::{
    DOWNLOAD_CHUNK_SIZE, HTTP_MAX_REDIRECTS, HTTP_READ_TIMEOUT, HTTP_REQUEST_TIMEOUT,
    HTTP_USER_AGENT, HTTPS_TCP_BUFFER_SIZE,
};

/// TCP Client mit genau einer gleichzeitigen Verbindung
pub type HttpsTcpClient<'a> = TcpClient<'a, 1, HTTPS_TCP_BUFFER_SIZE, HTTPS_TCP_BUFFER_SIZE>;

const API_HEADERS: [(&str, &str); 2] = [
    ("User-Agent", HTTP_USER_AGENT),
    ("Accept", "application/vnd.github+json"),
];

const DOWNLOAD_HEADERS: [(&str, &str); 2] = [
    ("User-Agent", HTTP_USER_AGENT),
    ("Accept", "application/octet-stream"),
];

pub struct HttpsTransport<'a> {
    client: HttpClient<'a, HttpsTcpClient<'a>, DnsSocket<'a>>,
    /// Empfangs-Buffer für Status-Zeile und Header
    header_buf: &'a mut [u8],
    chunk: [u8; DOWNLOAD_CHUNK_SIZE],
}

impl<'a> HttpsTransport<'a> {
    pub fn new(
        tcp: &'a HttpsTcpClient<'a>,
        dns: &'a DnsSocket<'a>,
        tls_read: &'a mut [u8],
        tls_write: &'a mut [u8],
        header_buf: &'a mut [u8],
        seed: u64,
    ) -> Self {
        let tls = TlsConfig::new(seed, tls_read, tls_write, TlsVerify::None);
        Self {
            client: HttpClient::new_with_tls(tcp, dns, tls),
            header_buf,
            chunk: [0; DOWNLOAD_CHUNK_SIZE],
        }
    }
}

fn map_error(error: reqwless::Error) -> TransportError {
    match error {
        reqwless::Error::Dns => TransportError::Dns,
        reqwless::Error::Network(_) => TransportError::Connect,
        reqwless::Error::Tls(_) => TransportError::Tls,
        reqwless::Error::BufferTooSmall => TransportError::BufferTooSmall,
        reqwless::Error::ConnectionAborted => TransportError::Closed,
        _ => TransportError::InvalidResponse,
    }
}

fn copy_url(raw: &[u8]) -> Result<Url, TransportError> {
    let text = core::str::from_utf8(raw).map_err(|_| TransportError::InvalidResponse)?;
    let mut url = Url::new();
    url.push_str(text.trim())
        .map_err(|_| TransportError::UrlTooLong)?;
    Ok(url)
}

/// Absolute Location eines Redirects
fn location<C: Read>(response: &Response<'_, '_, C>) -> Result<Option<Url>, TransportError> {
    let Some((_, value)) = response
        .headers()
        .find(|(name, _)| name.eq_ignore_ascii_case("location"))
    else {
        return Ok(None);
    };
    let url = copy_url(value)?;
    if !url.starts_with("https://") && !url.starts_with("http://") {
        warn!("HTTPS: relative redirect not supported");
        return Err(TransportError::InvalidResponse);
    }
    Ok(Some(url))
}

/// Liest den Body vollständig nach `buf`
async fn read_body<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize, TransportError> {
    let mut len = 0;
    loop {
        if len == buf.len() {
            // Nur ok, wenn der Body genau hier endet
            let mut probe = [0u8; 1];
            return match reader.read(&mut probe).await {
                Ok(0) => Ok(len),
                Ok(_) => Err(TransportError::BufferTooSmall),
                Err(_) => Err(TransportError::Closed),
            };
        }
        match reader.read(&mut buf[len..]).await {
            Ok(0) => return Ok(len),
            Ok(n) => len += n,
            Err(_) => return Err(TransportError::Closed),
        }
    }
}

impl FirmwareTransport for HttpsTransport<'_> {
    async fn fetch(&mut self, url: &str, buf: &mut [u8]) -> Result<usize, TransportError> {
        debug!("HTTPS: GET {}", url);
        let client = &mut self.client;
        let header_buf = &mut *self.header_buf;

        let request = async {
            let mut request = client
                .request(Method::GET, url)
                .await
                .map_err(map_error)?
                .headers(&API_HEADERS);
            let response = request.send(header_buf).await.map_err(map_error)?;

            let status = response.status.0;
            if !(200..300).contains(&status) {
                return Err(TransportError::Status(status));
            }
            let mut reader = response.body().reader();
            read_body(&mut reader, buf).await
        };

        with_timeout(HTTP_REQUEST_TIMEOUT, request)
            .await
            .map_err(|_| TransportError::Timeout)?
    }

    async fn probe(&mut self, url: &str) -> Result<ProbeResponse, TransportError> {
        debug!("HTTPS: HEAD {}", url);
        let client = &mut self.client;
        let header_buf = &mut *self.header_buf;

        let request = async {
            let mut request = client
                .request(Method::HEAD, url)
                .await
                .map_err(map_error)?
                .headers(&DOWNLOAD_HEADERS);
            let response = request.send(header_buf).await.map_err(map_error)?;
            Ok(ProbeResponse {
                status: response.status.0,
                location: location(&response)?,
            })
        };

        with_timeout(HTTP_REQUEST_TIMEOUT, request)
            .await
            .map_err(|_| TransportError::Timeout)?
    }

    async fn download<S: ImageSink>(&mut self, url: &str, sink: &mut S) -> Result<(), UpdateError> {
        let mut current = copy_url(url.as_bytes())?;

        for _hop in 0..=HTTP_MAX_REDIRECTS {
            let client = &mut self.client;
            let header_buf = &mut *self.header_buf;
            let chunk = &mut self.chunk;

            let next = {
                let mut request = with_timeout(
                    HTTP_REQUEST_TIMEOUT,
                    client.request(Method::GET, current.as_str()),
                )
                .await
                .map_err(|_| TransportError::Timeout)?
                .map_err(map_error)?
                .headers(&DOWNLOAD_HEADERS);

                let response = with_timeout(HTTP_REQUEST_TIMEOUT, request.send(header_buf))
                    .await
                    .map_err(|_| TransportError::Timeout)?
                    .map_err(map_error)?;

                let status = response.status.0;
                if (300..400).contains(&status) {
                    location(&response)?.ok_or(TransportError::InvalidResponse)?
                } else if !(200..300).contains(&status) {
                    return Err(TransportError::Status(status).into());
                } else {
                    let total = response
                        .content_length
                        .ok_or(TransportError::InvalidResponse)?;
                    let total = u32::try_from(total).map_err(|_| UpdateError::InvalidImage)?;
                    sink.begin(total)?;

                    let mut reader = response.body().reader();
                    let mut received: u32 = 0;
                    while received < total {
                        let n = with_timeout(HTTP_READ_TIMEOUT, reader.read(chunk))
                            .await
                            .map_err(|_| TransportError::Timeout)?
                            .map_err(|_| TransportError::Closed)?;
                        if n == 0 {
                            return Err(TransportError::Closed.into());
                        }
                        sink.write(&chunk[..n])?;
                        received += n as u32;
                    }
                    return Ok(());
                }
            };

            debug!("HTTPS: redirect -> {}", next.as_str());
            current = next;
        }

        warn!("HTTPS: too many redirects");
        Err(TransportError::TooManyRedirects.into())
    }
}

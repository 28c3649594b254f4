// AS name lookups through the bgp.tools bulk whois interface

use std::collections::BTreeMap;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::{AppError, AppResult};
use crate::routes::Asn;

pub const DEFAULT_WHOIS_SERVER: &str = "bgp.tools:43";

/// Resolve short names for `asns`. Any failure is logged and yields an empty map.
pub async fn query_as_names(server: &str, asns: &[Asn], timeout: Duration) -> BTreeMap<Asn, String> {
    if asns.is_empty() {
        return BTreeMap::new();
    }

    match tokio::time::timeout(timeout, bulk_query(server, asns)).await {
        Ok(Ok(response)) => {
            let names = parse_bulk_response(&response);
            tracing::debug!("Resolved {} of {} AS name(s)", names.len(), asns.len());
            names
        }
        Ok(Err(e)) => {
            tracing::warn!("Error resolving AS names: {}", e);
            BTreeMap::new()
        }
        Err(_) => {
            tracing::warn!("Timed out resolving AS names via {}", server);
            BTreeMap::new()
        }
    }
}

async fn bulk_query(server: &str, asns: &[Asn]) -> AppResult<String> {
    let mut stream = TcpStream::connect(server)
        .await
        .map_err(|e| AppError::Session(format!("whois connect to {}: {}", server, e)))?;

    let mut request = String::from("begin\n");
    for asn in asns {
        request.push_str(&format!("as{}\n", asn));
    }
    request.push_str("end\n");
    stream.write_all(request.as_bytes()).await?;

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await?;
    Ok(String::from_utf8_lossy(&response).into_owned())
}

/// Parse pipe-separated rows; the name is the first word of the last column.
pub fn parse_bulk_response(response: &str) -> BTreeMap<Asn, String> {
    response
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split('|').map(str::trim).collect();
            if parts.len() < 6 {
                return None;
            }
            let asn = parts[0].parse::<Asn>().ok()?;
            let name = parts
                .last()?
                .split(',')
                .next()?
                .split_whitespace()
                .next()?;
            Some((asn, name.to_string()))
        })
        .collect()
}

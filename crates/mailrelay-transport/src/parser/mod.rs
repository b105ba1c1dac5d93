//! Reply-line parser.

use crate::error::{Error, Result};
use crate::types::{Reply, ReplyCode};

/// Parses one reply line into a code/text pair.
///
/// The relay protocol uses single-line replies only:
/// `250 OK\r\n`, `354 start input\r\n`, and so on. The CRLF terminator
/// must already be stripped by the framing layer.
///
/// # Errors
///
/// Returns a framing error if the line is shorter than three digits,
/// the code is not numeric, or the separator is malformed.
pub fn parse_reply(line: &str) -> Result<Reply> {
    let Some(code_str) = line.get(0..3) else {
        return Err(Error::Framing(format!("reply too short: {line:?}")));
    };
    let code = code_str
        .parse::<u16>()
        .map_err(|_| Error::Framing(format!("invalid reply code: {code_str:?}")))?;

    let text = match line.as_bytes().get(3) {
        None => String::new(),
        Some(b' ') => line[4..].to_string(),
        Some(_) => {
            return Err(Error::Framing(format!("malformed reply line: {line:?}")));
        }
    };

    Ok(Reply::new(ReplyCode::new(code), text))
}

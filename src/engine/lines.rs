use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

/// Splits child output into lines on `\n`, `\r\n` and bare `\r`.
///
/// Progress bars redraw with `\r`; each redraw becomes its own line. Invalid
/// UTF-8 is replaced rather than rejected.
#[derive(Debug, Default)]
pub(crate) struct OutputLineCodec {
    // Bytes before this offset are known not to contain a terminator.
    scanned: usize,
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

impl Decoder for OutputLineCodec {
    type Item = String;
    type Error = std::io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, Self::Error> {
        let Some(offset) = buf[self.scanned..]
            .iter()
            .position(|b| *b == b'\n' || *b == b'\r')
        else {
            self.scanned = buf.len();
            return Ok(None);
        };
        let idx = self.scanned + offset;

        let terminator = if buf[idx] == b'\r' {
            match buf.get(idx + 1) {
                Some(b'\n') => 2,
                Some(_) => 1,
                // A trailing `\r` may be the first half of `\r\n`.
                None => {
                    self.scanned = idx;
                    return Ok(None);
                }
            }
        } else {
            1
        };

        let line = buf.split_to(idx);
        buf.advance(terminator);
        self.scanned = 0;
        Ok(Some(lossy(&line)))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, Self::Error> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        if buf.is_empty() {
            return Ok(None);
        }

        let mut rest = buf.split_to(buf.len());
        self.scanned = 0;
        if rest.last() == Some(&b'\r') {
            rest.truncate(rest.len() - 1);
        }
        Ok(Some(lossy(&rest)))
    }
}

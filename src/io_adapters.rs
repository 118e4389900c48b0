use std::io::{self, PipeReader, Read, Write};
use std::process::{ChildStdin, Stdio};
use std::thread::{self, JoinHandle};
use tracing::trace;

/// What a child process reads from.
#[derive(Debug)]
pub(crate) enum InputSource {
    /// Stdin closed from the start.
    Null,
    /// The caller's own stdin.
    Inherit,
    /// Literal bytes fed by a writer thread.
    Data(Vec<u8>),
    /// The read end of an upstream process's stdout.
    Pipe(PipeReader),
}

impl InputSource {
    /// Convert into a [`Stdio`] handle suitable for `std::process::Command`.
    ///
    /// `Data` becomes a pipe; the bytes themselves go through [`feed_stdin`].
    pub(crate) fn stdio(self) -> (Stdio, Option<Vec<u8>>) {
        match self {
            InputSource::Null => (Stdio::null(), None),
            InputSource::Inherit => (Stdio::inherit(), None),
            InputSource::Data(data) => (Stdio::piped(), Some(data)),
            InputSource::Pipe(reader) => (Stdio::from(reader), None),
        }
    }
}

/// Write `data` into the child's stdin on a separate thread, then close it.
///
/// A child that exits without reading everything is not an error.
pub(crate) fn feed_stdin(mut stdin: ChildStdin, data: Vec<u8>) -> JoinHandle<io::Result<()>> {
    thread::spawn(move || {
        let result = stdin.write_all(&data).and_then(|_| stdin.flush());
        trace!(bytes = data.len(), ok = result.is_ok(), "stdin feeder finished");
        match result {
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
            other => other,
        }
    })
}

fn read_all(mut reader: PipeReader) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    Ok(buf)
}

/// Read both output pipes to EOF concurrently, so neither can fill up and
/// stall the child while the other is being read.
pub(crate) fn drain(
    stdout: Option<PipeReader>,
    stderr: Option<PipeReader>,
) -> io::Result<(Option<Vec<u8>>, Option<Vec<u8>>)> {
    match (stdout, stderr) {
        (None, None) => Ok((None, None)),
        (Some(out), None) => Ok((Some(read_all(out)?), None)),
        (None, Some(err)) => Ok((None, Some(read_all(err)?))),
        (Some(out), Some(err)) => thread::scope(|scope| -> io::Result<_> {
            let err_reader = scope.spawn(move || read_all(err));
            let out = read_all(out);
            let err = err_reader
                .join()
                .unwrap_or_else(|_| Err(io::Error::other("stderr reader panicked")));
            trace!("drained stdout and stderr");
            Ok((Some(out?), Some(err?)))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_reads_both_pipes() {
        let (out_r, mut out_w) = io::pipe().unwrap();
        let (err_r, mut err_w) = io::pipe().unwrap();
        out_w.write_all(b"hello").unwrap();
        err_w.write_all(b"oops").unwrap();
        drop(out_w);
        drop(err_w);

        let (out, err) = drain(Some(out_r), Some(err_r)).unwrap();
        assert_eq!(out.as_deref(), Some(&b"hello"[..]));
        assert_eq!(err.as_deref(), Some(&b"oops"[..]));
    }

    #[test]
    fn test_drain_nothing() {
        let (out, err) = drain(None, None).unwrap();
        assert!(out.is_none());
        assert!(err.is_none());
    }

    #[test]
    fn test_drain_large_output_on_one_pipe() {
        let (out_r, mut out_w) = io::pipe().unwrap();
        let writer = thread::spawn(move || {
            out_w.write_all(&vec![b'a'; 1 << 20]).unwrap();
        });
        let (out, _) = drain(Some(out_r), None).unwrap();
        writer.join().unwrap();
        assert_eq!(out.unwrap().len(), 1 << 20);
    }
}

use wasmtime_wasi::p2::pipe::MemoryOutputPipe;
use wasmtime_wasi::WasiCtxBuilder;

const STDOUT_CAPACITY: usize = 1024 * 1024;
const STDERR_CAPACITY: usize = 256 * 1024;

/// In-memory stdout/stderr sinks for one guest run.
///
/// The pipes are attached to the WASI context when the store is built and read
/// back by [`finish`](Self::finish) whatever way the run ended, since the
/// context keeps only clones of them.
pub struct CaptureContext {
    stdout: MemoryOutputPipe,
    stderr: MemoryOutputPipe,
}

/// Text a run wrote to its standard streams.
#[derive(Debug, Default)]
pub struct Captured {
    pub stdout: String,
    pub stderr: String,
}

impl CaptureContext {
    pub fn new() -> Self {
        Self {
            stdout: MemoryOutputPipe::new(STDOUT_CAPACITY),
            stderr: MemoryOutputPipe::new(STDERR_CAPACITY),
        }
    }

    pub fn attach(&self, builder: &mut WasiCtxBuilder) {
        builder.stdout(self.stdout.clone()).stderr(self.stderr.clone());
    }

    pub fn finish(self) -> Captured {
        Captured {
            stdout: String::from_utf8_lossy(&self.stdout.contents()).into_owned(),
            stderr: String::from_utf8_lossy(&self.stderr.contents()).into_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unused_capture_is_empty() {
        let capture = CaptureContext::new();
        let mut builder = WasiCtxBuilder::new();
        capture.attach(&mut builder);
        let captured = capture.finish();
        assert!(captured.stdout.is_empty());
        assert!(captured.stderr.is_empty());
    }
}

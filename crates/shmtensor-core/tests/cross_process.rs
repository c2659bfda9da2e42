//! Cross-process smoke test
//!
//! Forks a real child process for the server side. Gated behind the
//! `integration` feature because fork-based tests do not mix with threaded
//! test runners:
//!
//! ```bash
//! cargo test --features integration --test cross_process -- --test-threads=1
//! ```

#[cfg(all(test, feature = "integration"))]
mod integration {
    use nix::sys::wait::{waitpid, WaitStatus};
    use nix::unistd::{fork, ForkResult};
    use std::thread;
    use std::time::{Duration, Instant};

    use shmtensor_core::{Client, ClientConfig, MemLayout, Server, ServerConfig, Tensor};

    fn unique_namespace() -> String {
        use std::time::{SystemTime, UNIX_EPOCH};
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        format!("xproc{ts}")
    }

    fn is_exit_success(status: WaitStatus) -> bool {
        matches!(status, WaitStatus::Exited(_, code) if code == 0)
    }

    #[test]
    fn tensor_written_by_child_is_read_by_parent() {
        let ns = unique_namespace();

        match unsafe { fork() }.unwrap() {
            ForkResult::Child => {
                // child: bring up the server, publish a pattern, hold the
                // segments open long enough for the parent to read
                let mut server = Server::<i32>::new(
                    2,
                    2,
                    "fork",
                    &ns,
                    ServerConfig {
                        layout: MemLayout::RowMajor,
                        ..ServerConfig::default()
                    },
                )
                .unwrap();
                server.run().unwrap();
                let pattern = Tensor::from_rows(&[&[11i32, 22], &[33, 44]], MemLayout::RowMajor);
                assert!(server.write(&pattern, 0, 0));
                thread::sleep(Duration::from_secs(2));
                server.close();
                std::process::exit(0);
            }
            ForkResult::Parent { child } => {
                let mut client = Client::<i32>::new(
                    "fork",
                    &ns,
                    ClientConfig {
                        layout: MemLayout::RowMajor,
                        attach_timeout_ms: 3_000,
                        ..ClientConfig::default()
                    },
                )
                .unwrap();
                client.attach().unwrap();

                // the write lands right after run(); poll briefly anyway
                let mut read = Tensor::<i32>::zeros(2, 2, MemLayout::RowMajor);
                let deadline = Instant::now() + Duration::from_secs(2);
                loop {
                    if client.read(&mut read, 0, 0) && read.get(0, 0) == 11 {
                        break;
                    }
                    assert!(Instant::now() < deadline, "pattern never appeared");
                    thread::sleep(Duration::from_millis(10));
                }
                assert_eq!(read.get(0, 1), 22);
                assert_eq!(read.get(1, 0), 33);
                assert_eq!(read.get(1, 1), 44);

                client.close();
                let status = waitpid(child, None).unwrap();
                assert!(is_exit_success(status));
            }
        }
    }
}

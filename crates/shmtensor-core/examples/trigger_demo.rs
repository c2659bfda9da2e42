//! Producer/consumer barrier with two consumer threads
//!
//! ```bash
//! cargo run --example trigger_demo
//! ```

use std::thread;
use std::time::Duration;

use shmtensor_core::{Consumer, CoordConfig, Producer};

const ROUNDS: usize = 3;
const N_CONSUMERS: usize = 2;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut producer = Producer::new("Demo", "shmtensor_trigger_demo", CoordConfig::default())?;
    producer.run()?;

    let consumers: Vec<_> = (0..N_CONSUMERS)
        .map(|id| {
            thread::spawn(move || {
                let mut consumer =
                    Consumer::new("Demo", "shmtensor_trigger_demo", CoordConfig::default())
                        .expect("consumer setup");
                consumer.run().expect("consumer run");
                for round in 0..ROUNDS {
                    let ok = consumer
                        .wait_and_ack(|| {
                            println!("consumer {id} handling round {round}");
                            true
                        }, Some(5_000))
                        .expect("wait_and_ack");
                    assert!(ok, "consumer {id} missed round {round}");
                }
                consumer.close();
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(100));
    for round in 0..ROUNDS {
        println!("producer: trigger {round}");
        assert!(producer.trigger());
        assert!(
            producer.wait_ack_from(N_CONSUMERS as i32, Some(5_000)),
            "round {round} not acknowledged in time"
        );
    }

    for handle in consumers {
        handle.join().unwrap();
    }
    producer.close();
    println!("all {ROUNDS} rounds acknowledged by {N_CONSUMERS} consumers");
    Ok(())
}

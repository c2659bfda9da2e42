//! Server/client round trip in one process
//!
//! ```bash
//! cargo run --example tensor_demo
//! ```

use shmtensor_core::{Client, ClientConfig, MemLayout, Server, ServerConfig, Tensor};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut server = Server::<f64>::new(
        3,
        3,
        "demo",
        "shmtensor_demo",
        ServerConfig {
            layout: MemLayout::RowMajor,
            ..ServerConfig::default()
        },
    )?;
    server.run()?;
    println!("server running at namespace shmtensor_demo");

    let written = Tensor::from_rows(
        &[&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0], &[7.0, 8.0, 9.0]],
        MemLayout::RowMajor,
    );
    assert!(server.write(&written, 0, 0));

    let mut client = Client::<f64>::new(
        "demo",
        "shmtensor_demo",
        ClientConfig {
            layout: MemLayout::RowMajor,
            ..ClientConfig::default()
        },
    )?;
    client.attach()?;
    println!(
        "client attached: {}x{} {:?}",
        client.n_rows(),
        client.n_cols(),
        client.scalar_type()
    );

    let mut read = Tensor::<f64>::zeros(3, 3, MemLayout::RowMajor);
    assert!(client.read(&mut read, 0, 0));
    for r in 0..3 {
        let row: Vec<f64> = (0..3).map(|c| read.get(r, c)).collect();
        println!("{row:?}");
    }

    client.close();
    server.close();
    Ok(())
}

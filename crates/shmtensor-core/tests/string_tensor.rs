//! String tensor scenarios across a server/client pair

use std::sync::atomic::{AtomicUsize, Ordering};

use shmtensor_core::{ClientConfig, ServerConfig, StringTensorClient, StringTensorServer};

static TEST_ID: AtomicUsize = AtomicUsize::new(0);

fn unique_namespace() -> String {
    let n = TEST_ID.fetch_add(1, Ordering::SeqCst);
    format!("strtens{}n{}", std::process::id(), n)
}

#[test]
fn string_vector_round_trips_through_a_client() {
    let ns = unique_namespace();
    let mut server =
        StringTensorServer::server(5, 8, "Names", &ns, ServerConfig::default()).unwrap();
    server.run().unwrap();

    let written = vec![
        "alpha".to_string(),
        "β".to_string(),
        "gamma-1".to_string(),
        String::new(),
        "Σ".to_string(),
    ];
    assert!(server.write_vec(&written, 0));

    let mut client = StringTensorClient::client("Names", &ns, ClientConfig::default()).unwrap();
    client.run().unwrap();
    assert_eq!(client.length(), 5);

    let mut read = vec![String::new(); 5];
    assert!(client.read_vec(&mut read, 0));
    assert_eq!(read, written);
}

#[test]
fn client_writes_are_visible_to_the_server() {
    let ns = unique_namespace();
    let mut server =
        StringTensorServer::server(3, 8, "Back", &ns, ServerConfig::default()).unwrap();
    server.run().unwrap();

    let mut client = StringTensorClient::client("Back", &ns, ClientConfig::default()).unwrap();
    client.run().unwrap();
    assert!(client.write_str("from-client", 2));

    let mut out = String::new();
    assert!(server.read_str(&mut out, 2));
    assert_eq!(out, "from-client");
}

#[test]
fn column_offset_writes_leave_neighbours_alone() {
    let ns = unique_namespace();
    let mut server =
        StringTensorServer::server(4, 4, "Offs", &ns, ServerConfig::default()).unwrap();
    server.run().unwrap();

    assert!(server.write_vec(&["a", "b", "c", "d"], 0));
    assert!(server.write_vec(&["X", "Y"], 1));

    let mut read = vec![String::new(); 4];
    assert!(server.read_vec(&mut read, 0));
    assert_eq!(read, ["a", "X", "Y", "d"]);
}

#[test]
fn string_server_counts_attached_clients() {
    let ns = unique_namespace();
    let mut server =
        StringTensorServer::server(2, 4, "Cnt", &ns, ServerConfig::default()).unwrap();
    server.run().unwrap();
    assert_eq!(server.n_clients(), 0);

    let mut client = StringTensorClient::client("Cnt", &ns, ClientConfig::default()).unwrap();
    client.run().unwrap();
    assert_eq!(server.n_clients(), 1);

    client.close();
    assert_eq!(server.n_clients(), 0);
}

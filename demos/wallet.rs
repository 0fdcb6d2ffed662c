use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use walletconnect_core::rpc::{JsonRpcErrorObject, JsonRpcResponse, codes};
use walletconnect_core::types::{Metadata, Namespace};
use walletconnect_core::{CoreClient, CoreConfig, SignEvent};

const ADDRESS: &str = "0x0000000000000000000000000000000000000123";

#[tokio::main]
async fn main() -> walletconnect_core::Result<()> {
    env_logger::init();

    // WalletConnect URI - you can get it by visiting any dApp and clicking on
    // "Connect Wallet" and select WalletConnect
    let uri_from_dapp = std::env::args()
        .nth(1)
        .ok_or("usage: wallet <wc: uri>")?;

    // ProjectId is required to prevent DOS on the relay. In case following
    // cause rate limits, you can create your own from https://cloud.reown.com
    let project_id = "35d44d49c2dee217a3eb24bb4410acc7";

    let config = CoreConfig::new(
        project_id,
        Metadata {
            name: "WalletConnect Rust Core".to_string(),
            description: "Demo wallet approving every proposal for one account".to_string(),
            url: "https://github.com/zemse/walletconnect-sdk-rs".to_string(),
            icons: vec![],
            redirect: None,
        },
    )
    // Used to sign relay JWTs. Must be generated and stored by the client,
    // the same seed should be reused for all connections.
    .with_client_seed([123u8; 32]);

    let relay = Arc::new(config.connect_relay()?);
    relay.spawn_polling(Duration::from_secs(2));
    let client = CoreClient::init(config, relay)?;
    let sign = client.sign().clone();

    let mut events = sign.events();
    sign.pair(&uri_from_dapp).await?;
    println!("paired, waiting for a proposal");

    while let Ok(event) = events.recv().await {
        match event {
            SignEvent::SessionProposal(proposal) => {
                println!("proposal from {}", proposal.params.proposer.metadata.name);

                let chains = vec!["eip155:1".to_string()];
                let namespaces = HashMap::from([(
                    "eip155".to_string(),
                    Namespace {
                        accounts: Some(chains.iter().map(|c| format!("{c}:{ADDRESS}")).collect()),
                        chains,
                        methods: vec![
                            "personal_sign".to_string(),
                            "eth_sendTransaction".to_string(),
                        ],
                        events: vec!["accountsChanged".to_string(), "chainChanged".to_string()],
                    },
                )]);

                match sign
                    .approve(&proposal.proposer_public_key, namespaces, None, None)
                    .await
                {
                    Ok(session) => println!("session {} approved", session.topic),
                    Err(e) => println!("approve failed: {e}"),
                }
            }
            SignEvent::SessionSettled(session) => {
                println!("session {} settled", session.topic);
            }
            SignEvent::SessionRequest { topic, id, method, params, .. } => {
                // This demo holds no keys
                println!("rejecting {method}: {params}");
                let response = JsonRpcResponse::error(
                    id,
                    JsonRpcErrorObject::new(codes::USER_REJECTED, "User rejected."),
                );
                sign.respond(&topic, response).await?;
            }
            SignEvent::SessionDelete { topic, reason } => {
                println!("session {topic} deleted: {reason}");
                break;
            }
            other => println!("event: {other:?}"),
        }
    }

    client.shutdown()
}

//! Optional node roles and the message handlers each one registers.

use {
    crate::{
        handlers::{
            BlockAnnounceHandler, BlockGetHandler, TxSubmitHandler, VoteHandler,
            VoteRequestHandler,
        },
        protocol::{
            BLOCK_ANNOUNCE_KIND, BLOCK_GET_KIND, TX_SUBMIT_KIND, TX_VOTE_KIND,
            TX_VOTE_REQUEST_KIND,
        },
        service::NodeServices,
    },
    meshledger_net::MeshMessengerBuilder,
    serde::{Deserialize, Serialize},
    std::{fmt, sync::Arc},
    tokio_util::sync::CancellationToken,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feature {
    /// Accepts transactions and originates vote rounds for them.
    Endpoint,
    /// Invites peers with discovery announcements at start-up and whenever
    /// a new peer enters.
    Routing,
    /// Holds the chain: serves blocks, applies announced blocks and catches
    /// up from peers.
    Storage,
    /// Applies accepted blocks to the history tracker and votes on other
    /// nodes' transactions.
    Tracker,
}

impl Feature {
    pub const ALL: [Feature; 4] = [
        Feature::Endpoint,
        Feature::Routing,
        Feature::Storage,
        Feature::Tracker,
    ];

    /// Message kinds this feature answers.
    pub fn kinds(self) -> &'static [&'static str] {
        match self {
            Feature::Endpoint => &[TX_SUBMIT_KIND, TX_VOTE_KIND],
            Feature::Routing => &[],
            Feature::Storage => &[BLOCK_GET_KIND, BLOCK_ANNOUNCE_KIND],
            Feature::Tracker => &[TX_VOTE_REQUEST_KIND],
        }
    }

    /// Register this feature's handlers on `builder`.
    pub fn install(
        self,
        builder: MeshMessengerBuilder,
        services: &Arc<NodeServices>,
        cancel: &CancellationToken,
    ) -> MeshMessengerBuilder {
        match self {
            Feature::Endpoint => builder
                .handler(
                    TX_SUBMIT_KIND,
                    Arc::new(TxSubmitHandler::new(services, cancel.clone())),
                )
                .handler(TX_VOTE_KIND, Arc::new(VoteHandler::new(services))),
            Feature::Routing => builder,
            Feature::Storage => builder
                .handler(BLOCK_GET_KIND, Arc::new(BlockGetHandler::new(services)))
                .handler(
                    BLOCK_ANNOUNCE_KIND,
                    Arc::new(BlockAnnounceHandler::new(services)),
                ),
            Feature::Tracker => builder.handler(
                TX_VOTE_REQUEST_KIND,
                Arc::new(VoteRequestHandler::new(services)),
            ),
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Feature::Endpoint => "endpoint",
            Feature::Routing => "routing",
            Feature::Storage => "storage",
            Feature::Tracker => "tracker",
        };
        f.write_str(name)
    }
}

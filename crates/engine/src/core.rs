// stepviz - Step-by-step Program State Tracer
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! The tracer: one complete trace session from the first command to the last
//! result.
//!
//! # Workflow
//!
//! 1. Wait for the consumer's initial `advance`
//! 2. Obtain the launchable artifact from the [`ArtifactProducer`]
//! 3. Launch and attach to the target, then publish `started`
//! 4. Step through the target, publishing one snapshot per `advance`
//! 5. Publish `finished`, or a single `error` if anything failed

use stepviz_common::{
    types::{Command, TraceResult},
    ArtifactProducer, Connector,
};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::{
    channel::{channel, ClientEndpoint, TracerEndpoint},
    config::TracerConfig,
    coordinator::StepCoordinator,
    errors::{Result, TraceError},
    inspector::SnapshotBuilder,
    session::SessionController,
};

/// Runs one trace session
#[derive(Debug)]
pub struct Tracer<C, P> {
    connector: C,
    producer: P,
    config: TracerConfig,
    endpoint: TracerEndpoint,
}

impl<C: Connector, P: ArtifactProducer> Tracer<C, P> {
    /// Create a tracer serving the consumer at the other end of `endpoint`
    pub fn new(connector: C, producer: P, config: TracerConfig, endpoint: TracerEndpoint) -> Self {
        Self { connector, producer, config, endpoint }
    }

    /// Run the session to completion and return the number of published snapshots
    ///
    /// Blocks the calling thread. Any failure is published to the consumer as
    /// a single `error` result before it is returned.
    pub fn run(self) -> Result<usize> {
        let Self { connector, mut producer, config, mut endpoint } = self;

        match trace(connector, &mut producer, config, &mut endpoint) {
            Ok(steps) => {
                info!("Trace finished after {steps} steps");
                endpoint.publish(TraceResult::Finished)?;
                Ok(steps)
            }
            Err(err) => {
                error!("Trace failed: {err}");
                if !matches!(err, TraceError::ChannelClosed) {
                    let published = endpoint.publish(TraceResult::error(err.to_string()));
                    if let Err(publish_err) = published {
                        warn!("Error not delivered: {publish_err}");
                    }
                }
                Err(err)
            }
        }
    }
}

fn trace<C: Connector, P: ArtifactProducer>(
    connector: C,
    producer: &mut P,
    config: TracerConfig,
    endpoint: &mut TracerEndpoint,
) -> Result<usize> {
    if endpoint.next_command()? == Command::Terminate {
        info!("Terminated before the target was launched");
        return Ok(0);
    }

    let artifact = producer.produce().map_err(TraceError::Artifact)?;
    info!("Artifact for {} ready at {}", artifact.main_type, artifact.location.display());

    let builder = SnapshotBuilder::for_artifact(&artifact);
    let mut controller = SessionController::new(connector, config);
    controller.attach(&artifact)?;
    endpoint.publish(TraceResult::Started)?;

    let mut coordinator = StepCoordinator::new(endpoint, builder);
    controller.run(&mut coordinator)?;
    Ok(coordinator.steps())
}

/// Run a tracer on tokio's blocking pool and return the consumer's endpoint
pub fn spawn_tracer<C, P>(
    connector: C,
    producer: P,
    config: TracerConfig,
) -> (JoinHandle<Result<usize>>, ClientEndpoint)
where
    C: Connector + Send + 'static,
    P: ArtifactProducer + Send + 'static,
{
    let (endpoint, client) = channel(config.channel_capacity);
    let tracer = Tracer::new(connector, producer, config, endpoint);
    (tokio::task::spawn_blocking(move || tracer.run()), client)
}

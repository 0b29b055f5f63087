//! Router facade
//!
//! Owns both matrix handles and the virtual state subscription. Everything
//! a client can do (route, read, watch) goes through here.

use tokio::sync::{mpsc, watch};
use tracing::info;

use crate::driver::{MatrixControl, MatrixHandle};
use crate::events::MatrixEvent;
use crate::publisher::{StatePublisher, VirtualState};
use crate::queue::{CommandError, CommandTicket};
use crate::routing::{
    compute_virtual_state, parse_virtual_input, parse_virtual_output, RouteError, RoutePlan,
    VirtualInput, VirtualOutput,
};

/// Completion tickets for every physical command of one route
#[derive(Debug)]
pub struct RouteTickets {
    pub hdmi: CommandTicket,
    pub component: Vec<CommandTicket>,
}

impl RouteTickets {
    /// Wait for every command; the first failure wins
    pub async fn wait(self) -> Result<(), CommandError> {
        let mut result = self.hdmi.wait().await;
        for ticket in self.component {
            let outcome = ticket.wait().await;
            if result.is_ok() {
                result = outcome;
            }
        }
        result
    }
}

/// Routes virtual requests onto the two matrices
pub struct Router<M = MatrixHandle> {
    hdmi: M,
    component: M,
    virtual_rx: watch::Receiver<VirtualState>,
}

impl Router<MatrixHandle> {
    /// Wire two running drivers to a state publisher fed by `event_rx`
    ///
    /// `event_rx` must be the receiving end of the channel both drivers
    /// were created with.
    pub fn start(
        hdmi: MatrixHandle,
        component: MatrixHandle,
        event_rx: mpsc::Receiver<MatrixEvent>,
    ) -> Self {
        let (publisher, virtual_rx) = StatePublisher::new(hdmi.outputs(), component.outputs());
        tokio::spawn(publisher.run(event_rx));
        Self::new(hdmi, component, virtual_rx)
    }

    pub fn shutdown(&self) {
        self.hdmi.shutdown();
        self.component.shutdown();
    }
}

impl<M: MatrixControl> Router<M> {
    pub fn new(hdmi: M, component: M, virtual_rx: watch::Receiver<VirtualState>) -> Self {
        Self {
            hdmi,
            component,
            virtual_rx,
        }
    }

    pub fn hdmi(&self) -> &M {
        &self.hdmi
    }

    pub fn component(&self) -> &M {
        &self.component
    }

    /// Show `input` on `output`
    ///
    /// Issues one HDMI call (a no-op for CRT outputs) and zero, one or two
    /// component calls. Never blocks.
    pub fn set_route(&self, output: VirtualOutput, input: VirtualInput) -> RouteTickets {
        info!("SET_OUTPUT | output: {:?}, input: {:?}", output, input);
        let plan = RoutePlan::new(output, input);

        let (hdmi_output, hdmi_input) = plan.hdmi;
        let hdmi = self
            .hdmi
            .set_output(hdmi_output.map(|o| o.port()), hdmi_input.port());

        let component = plan
            .component
            .iter()
            .map(|(out, source)| self.component.set_output(Some(out.port()), source.port()))
            .collect();

        RouteTickets { hdmi, component }
    }

    /// [`set_route`](Self::set_route) with client-supplied indices
    pub fn set_route_raw(&self, output: &str, input: &str) -> Result<RouteTickets, RouteError> {
        let output = parse_virtual_output(output)?;
        let input = parse_virtual_input(input)?;
        Ok(self.set_route(output, input))
    }

    /// Last published virtual route vector
    pub fn virtual_state(&self) -> VirtualState {
        self.virtual_rx.borrow().clone()
    }

    /// Virtual route vector computed from the drivers right now
    pub fn current_virtual_state(&self) -> VirtualState {
        compute_virtual_state(&self.hdmi.outputs(), &self.component.outputs())
    }

    /// Subscribe to published virtual route vectors
    pub fn subscribe(&self) -> watch::Receiver<VirtualState> {
        self.virtual_rx.clone()
    }
}

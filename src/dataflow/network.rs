//! A built dataflow graph.
//!
//! [`Network::build`] creates every component of a [`GraphConfig`] through
//! the factory, binds each input edge to the output named in its `source`
//! and assigns delivery priorities. Starting runs sinks first so that no
//! source pushes into a component that is not yet running; stopping runs
//! sources first. Dropping the network stops it and disconnects all ports.

use super::component::{BuildContext, Component};
use super::error::{DataflowError, DataflowResult};
use super::factory::ComponentFactory;
use super::port::{self, PortKind};
use super::scheduler::{DispatchMode, EventQueue};
use crate::config::{EdgeMode, GraphConfig};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub struct Network {
    components: Vec<Arc<dyn Component>>,
    index: HashMap<String, usize>,
    /// Component indices in dependency order, producers first.
    order: Vec<usize>,
    depth: Vec<u32>,
    queue: Arc<EventQueue>,
    running: AtomicBool,
}

impl std::fmt::Debug for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Network")
            .field("index", &self.index)
            .field("order", &self.order)
            .field("depth", &self.depth)
            .field("running", &self.running)
            .finish_non_exhaustive()
    }
}

impl Network {
    pub fn build(
        graph: &GraphConfig,
        factory: &ComponentFactory,
        mode: DispatchMode,
    ) -> DataflowResult<Self> {
        let queue = EventQueue::new(mode);
        let ctx = BuildContext::new(queue.clone());

        let mut components: Vec<Arc<dyn Component>> = Vec::with_capacity(graph.components.len());
        let mut index = HashMap::new();
        for config in &graph.components {
            if index.insert(config.id.clone(), components.len()).is_some() {
                return Err(DataflowError::invalid_attribute(
                    &config.id,
                    "id",
                    "component id used twice",
                ));
            }
            tracing::debug!("Creating component {} ({})", config.id, config.class);
            components.push(factory.create(config, &ctx)?);
        }

        // ordering edges: push wiring plus explicit "deliver after" constraints
        let mut ordering: Vec<(usize, usize)> = Vec::new();
        for (to, config) in graph.components.iter().enumerate() {
            for edge in config.inputs() {
                let Some(source) = &edge.source else {
                    continue;
                };
                let from = *index
                    .get(&source.component)
                    .ok_or_else(|| DataflowError::UnknownComponent(source.component.clone()))?;
                let output = find_port(&components[from], &source.edge)?;
                let input = find_port(&components[to], &edge.name)?;
                if input.descriptor().kind.mode() != edge.mode {
                    return Err(DataflowError::ModeMismatch {
                        from: output.full_name(),
                        to: input.full_name(),
                        message: format!(
                            "edge is configured {} but the port is {}",
                            edge.mode,
                            input.descriptor().kind
                        ),
                    });
                }
                port::connect(output.as_ref(), input.as_ref())?;
                if edge.mode == EdgeMode::Push {
                    ordering.push((from, to));
                }

                if let Some(after) = &edge.after {
                    let before = *index
                        .get(&after.component)
                        .ok_or_else(|| DataflowError::UnknownComponent(after.component.clone()))?;
                    find_port(&components[before], &after.edge)?;
                    ordering.push((before, to));
                }
            }
        }

        let (order, depth) = dependency_order(components.len(), &ordering);
        for (i, component) in components.iter().enumerate() {
            for port in component.ports().iter() {
                if port.descriptor().kind == PortKind::PushConsumer {
                    port.set_priority(depth[i]);
                }
            }
        }

        tracing::info!(
            "Built network: {} components, {} push/ordering edges, dispatch {:?}",
            components.len(),
            ordering.len(),
            mode
        );
        Ok(Self {
            components,
            index,
            order,
            depth,
            queue,
            running: AtomicBool::new(false),
        })
    }

    pub fn component(&self, id: &str) -> Option<&Arc<dyn Component>> {
        self.index.get(id).map(|&i| &self.components[i])
    }

    pub fn components(&self) -> impl Iterator<Item = &Arc<dyn Component>> {
        self.components.iter()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Depth of a component over push edges; its consumers' delivery
    /// priority.
    pub fn depth(&self, id: &str) -> Option<u32> {
        self.index.get(id).map(|&i| self.depth[i])
    }

    /// Typed handle of a component port.
    pub fn port<P: Clone + 'static>(&self, component: &str, port: &str) -> DataflowResult<P> {
        let c = self
            .component(component)
            .ok_or_else(|| DataflowError::UnknownComponent(component.to_string()))?;
        c.ports().typed(component, port)
    }

    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Start all components, consumers before producers. On failure the
    /// components already started are stopped again.
    pub fn start(&self) -> DataflowResult<()> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        for (n, &i) in self.order.iter().rev().enumerate() {
            if let Err(err) = self.components[i].start() {
                tracing::error!(
                    "Failed to start component {}: {}",
                    self.components[i].name(),
                    err
                );
                for &j in self.order.iter().rev().take(n) {
                    self.components[j].stop();
                }
                self.running.store(false, Ordering::Release);
                return Err(err);
            }
        }
        tracing::info!("Network started");
        Ok(())
    }

    /// Stop all components, producers first.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        for &i in &self.order {
            self.components[i].stop();
        }
        tracing::info!("Network stopped");
    }
}

impl Drop for Network {
    fn drop(&mut self) {
        self.stop();
        for component in &self.components {
            component.ports().disconnect_all();
        }
        self.queue.shutdown();
    }
}

fn find_port(
    component: &Arc<dyn Component>,
    name: &str,
) -> DataflowResult<Arc<dyn port::Port>> {
    component
        .ports()
        .get(name)
        .cloned()
        .ok_or_else(|| DataflowError::NoSuchPort {
            component: component.name().to_string(),
            port: name.to_string(),
        })
}

/// Kahn ordering with longest-path depth. Components on a cycle are
/// appended in insertion order with the depth reached so far.
fn dependency_order(n: usize, edges: &[(usize, usize)]) -> (Vec<usize>, Vec<u32>) {
    let mut in_degree = vec![0u32; n];
    let mut adj: Vec<Vec<usize>> = vec![Vec::new(); n];
    for &(from, to) in edges {
        adj[from].push(to);
        in_degree[to] += 1;
    }

    let mut depth = vec![0u32; n];
    let mut ready: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(node) = ready.pop_front() {
        order.push(node);
        for &next in &adj[node] {
            depth[next] = depth[next].max(depth[node] + 1);
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push_back(next);
            }
        }
    }

    if order.len() != n {
        tracing::warn!(
            "Dataflow graph has a cycle! Only {} of {} components ordered.",
            order.len(),
            n
        );
        let mut placed = vec![false; n];
        for &i in &order {
            placed[i] = true;
        }
        order.extend((0..n).filter(|&i| !placed[i]));
    }
    (order, depth)
}

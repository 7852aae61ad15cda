//! Containers: [`Bin`] groups elements, [`Pipeline`] is the top-level bin with a bus.

use std::ops::Deref;
use std::sync::{Arc, Mutex};

use crossbeam_channel::Receiver;

use crate::bus::{Bus, MessageView};
use crate::element::{Context, Element, ElementImpl};
use crate::error::{EngineError, StateChangeError};
use crate::event::EngineEvent;
use crate::pad::Pad;
use crate::state::{State, StateChange};

#[derive(Debug, Default)]
pub struct BinImpl {
    children: Mutex<Vec<Element>>,
}

impl BinImpl {
    pub fn children(&self) -> Vec<Element> {
        self.children.lock().unwrap().clone()
    }
}

impl ElementImpl for BinImpl {
    /// Children change sinks first, i.e. in reverse order of addition.
    ///
    /// An upward step that fails rolls back the children that already moved.
    /// Downward steps visit every child and report the first failure.
    fn change_state(&self, _element: &Element, transition: StateChange) -> Result<(), StateChangeError> {
        let children = self.children();
        let mut moved: Vec<&Element> = Vec::with_capacity(children.len());
        let mut first_err = None;

        for child in children.iter().rev() {
            match child.set_state(transition.next) {
                Ok(()) => moved.push(child),
                Err(err) if transition.is_upward() => {
                    for done in moved {
                        let _ = done.set_state(transition.current);
                    }
                    return Err(err);
                }
                Err(err) => {
                    first_err.get_or_insert(err);
                }
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Handle to a bin element.
#[derive(Clone, Debug)]
pub struct Bin {
    element: Element,
    imp: Arc<BinImpl>,
}

impl Bin {
    pub fn new(name: impl Into<String>) -> Self {
        let imp = Arc::new(BinImpl::default());
        let element = Element::with_imp(name, "bin", imp.clone());
        Self { element, imp }
    }

    pub fn from_element(element: &Element) -> Option<Self> {
        let imp = element.imp::<BinImpl>()?;
        Some(Self {
            element: element.clone(),
            imp,
        })
    }

    pub fn element(&self) -> &Element {
        &self.element
    }

    pub fn add(&self, child: &Element) -> Result<(), EngineError> {
        if self.imp.children().iter().any(|c| c.name() == child.name()) {
            return Err(EngineError::DuplicateElement {
                bin: self.element.name().to_string(),
                element: child.name().to_string(),
            });
        }
        child.set_parent(&self.element)?;
        self.imp.children.lock().unwrap().push(child.clone());
        if let Some(ctx) = self.element.context() {
            child.set_context(ctx.clone());
        }
        Ok(())
    }

    pub fn add_many(&self, children: &[&Element]) -> Result<(), EngineError> {
        for child in children {
            self.add(child)?;
        }
        Ok(())
    }

    pub fn children(&self) -> Vec<Element> {
        self.imp.children()
    }

    /// Find an element by name anywhere below this bin.
    pub fn by_name(&self, name: &str) -> Option<Element> {
        for child in self.imp.children() {
            if child.name() == name {
                return Some(child);
            }
            if let Some(found) = Bin::from_element(&child).and_then(|bin| bin.by_name(name)) {
                return Some(found);
            }
        }
        None
    }

    /// Expose `target` (a pad of a child) on the bin under `name`.
    pub fn add_ghost_pad(&self, name: &str, target: &Pad) -> Result<Pad, EngineError> {
        let ghost = Pad::new_ghost(name, target);
        self.element.add_pad(ghost.clone())?;
        Ok(ghost)
    }
}

impl Deref for Bin {
    type Target = Element;

    fn deref(&self) -> &Element {
        &self.element
    }
}

struct PipelineInner {
    bin: Bin,
    bus: Bus,
    events: Receiver<EngineEvent>,
    change_lock: Mutex<()>,
}

/// Top-level bin owning the bus and the engine event channel.
#[derive(Clone)]
pub struct Pipeline(Arc<PipelineInner>);

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        let bin = Bin::new(name);
        let bus = Bus::new();
        let (tx, rx) = crossbeam_channel::unbounded();
        bin.element().set_context(Context::new(bus.clone(), tx));
        Pipeline(Arc::new(PipelineInner {
            bin,
            bus,
            events: rx,
            change_lock: Mutex::new(()),
        }))
    }

    pub fn bin(&self) -> &Bin {
        &self.0.bin
    }

    pub fn name(&self) -> &str {
        self.0.bin.element().name()
    }

    pub fn add(&self, child: &Element) -> Result<(), EngineError> {
        self.0.bin.add(child)
    }

    pub fn add_many(&self, children: &[&Element]) -> Result<(), EngineError> {
        self.0.bin.add_many(children)
    }

    pub fn by_name(&self, name: &str) -> Option<Element> {
        self.0.bin.by_name(name)
    }

    pub fn bus(&self) -> &Bus {
        &self.0.bus
    }

    /// Engine events (pad discovery, backpressure) for the pipeline owner.
    pub fn events(&self) -> &Receiver<EngineEvent> {
        &self.0.events
    }

    pub fn state(&self) -> State {
        self.0.bin.element().current_state()
    }

    pub fn set_state(&self, target: State) -> Result<(), StateChangeError> {
        let _guard = self.0.change_lock.lock().unwrap();
        self.apply(target)
    }

    /// Compute the target state and apply it under the pipeline's state lock.
    ///
    /// Callers that derive the target from shared state read it inside `target`, so concurrent
    /// callers apply their reads in the same order they were made.
    pub fn set_state_with(&self, target: impl FnOnce() -> State) -> Result<State, StateChangeError> {
        let _guard = self.0.change_lock.lock().unwrap();
        let target = target();
        self.apply(target).map(|()| target)
    }

    fn apply(&self, target: State) -> Result<(), StateChangeError> {
        let element = self.0.bin.element();
        let old = element.current_state();
        match element.set_state(target) {
            Ok(()) => {
                if old != target {
                    tracing::debug!(pipeline = %self.name(), from = %old, to = %target, "pipeline state changed");
                    element.post_message(MessageView::StateChanged {
                        old,
                        current: target,
                    });
                }
                Ok(())
            }
            Err(err) => {
                element.post_error(
                    format!("State change of element `{}` failed.", err.element),
                    Some(err.to_string()),
                );
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Buffer;
    use crate::pad::{FlowReturn, PadDirection};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Probe {
        order: Arc<Mutex<Vec<String>>>,
        fail_ready: bool,
        buffers: AtomicUsize,
    }

    impl ElementImpl for Probe {
        fn chain(&self, _element: &Element, _pad: &Pad, _buffer: Buffer) -> FlowReturn {
            self.buffers.fetch_add(1, Ordering::SeqCst);
            FlowReturn::Ok
        }

        fn change_state(&self, element: &Element, transition: StateChange) -> Result<(), StateChangeError> {
            if self.fail_ready && transition == StateChange::NULL_TO_READY {
                return Err(StateChangeError::new(element, transition, "nope"));
            }
            self.order
                .lock()
                .unwrap()
                .push(format!("{}:{}", element.name(), transition.next));
            Ok(())
        }
    }

    fn probe(name: &str, order: &Arc<Mutex<Vec<String>>>, fail_ready: bool) -> (Element, Arc<Probe>) {
        let imp = Arc::new(Probe {
            order: order.clone(),
            fail_ready,
            buffers: AtomicUsize::new(0),
        });
        let el = Element::with_imp(name, "probe", imp.clone());
        el.add_pad(Pad::new("src", PadDirection::Src)).unwrap();
        el.add_pad(Pad::new("sink", PadDirection::Sink)).unwrap();
        (el, imp)
    }

    #[test]
    fn children_change_sink_first_and_post_state_changed() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new("p");
        let (src, _) = probe("src", &order, false);
        let (sink, _) = probe("sink", &order, false);
        pipeline.add_many(&[&src, &sink]).unwrap();

        pipeline.set_state(State::Ready).unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["sink:READY", "src:READY"]);
        assert_eq!(pipeline.state(), State::Ready);

        let msg = pipeline.bus().pop().unwrap();
        assert_eq!(
            msg.view,
            MessageView::StateChanged {
                old: State::Null,
                current: State::Ready
            }
        );
    }

    #[test]
    fn failed_upward_change_rolls_back_and_posts_error() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new("p");
        let (src, _) = probe("src", &order, true);
        let (sink, _) = probe("sink", &order, false);
        pipeline.add_many(&[&src, &sink]).unwrap();

        let err = pipeline.set_state(State::Playing).unwrap_err();
        assert_eq!(err.element, "src");
        assert_eq!(pipeline.state(), State::Null);
        assert_eq!(sink.current_state(), State::Null);

        let msg = pipeline.bus().pop().unwrap();
        assert_eq!(msg.type_name(), "error");
    }

    #[test]
    fn set_state_with_reads_target_under_lock() {
        let pipeline = Pipeline::new("p");
        let applied = pipeline.set_state_with(|| State::Paused).unwrap();
        assert_eq!(applied, State::Paused);
        assert_eq!(pipeline.state(), State::Paused);
    }

    #[test]
    fn duplicate_child_and_reparenting_rejected() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new("p");
        let bin = Bin::new("b");
        let (a, _) = probe("a", &order, false);
        let (a2, _) = probe("a", &order, false);

        bin.add(&a).unwrap();
        assert!(matches!(
            bin.add(&a2),
            Err(EngineError::DuplicateElement { .. })
        ));
        assert!(matches!(
            pipeline.add(&a),
            Err(EngineError::AlreadyParented(_))
        ));
    }

    #[test]
    fn ghost_pad_forwards_into_bin() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new("p");
        let (src, _) = probe("src", &order, false);
        let (inner, inner_imp) = probe("inner", &order, false);
        let bin = Bin::new("bin");
        bin.add(&inner).unwrap();
        let ghost = bin
            .add_ghost_pad("sink", &inner.static_pad("sink").unwrap())
            .unwrap();
        pipeline.add_many(&[&src, bin.element()]).unwrap();

        src.static_pad("src").unwrap().link(&ghost).unwrap();
        assert!(ghost.is_linked());
        assert_eq!(pipeline.by_name("inner"), Some(inner.clone()));

        pipeline.set_state(State::Playing).unwrap();
        let flow = src.static_pad("src").unwrap().push(Buffer::from_slice(&[1, 2]));
        assert_eq!(flow, FlowReturn::Ok);
        assert_eq!(inner_imp.buffers.load(Ordering::SeqCst), 1);
    }
}

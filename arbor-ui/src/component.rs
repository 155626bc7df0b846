use crate::action::{Action, ActionHandler};
use crate::context::Context;
use crate::error::RegistryError;
use crate::node::{Node, Tag};
use std::any::Any;
use std::collections::HashMap;
use url::Url;

pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A stateful piece of UI.
///
/// `render` describes what the component looks like right now. The engine
/// calls it on mount and whenever the component is marked dirty, then patches
/// the native tree with the difference.
///
/// Lifecycle hooks default to no-ops. `on_mount` runs through the dispatch
/// queue after the component is attached; `on_dismount` runs while the
/// component is being torn down and must not rely on its subtree.
pub trait Component: AsAny {
    /// `None` means the component has nothing to show, which is a mount error.
    fn render(&self) -> Option<Node>;

    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Copies the fields of `next`, a freshly described value of the same
    /// type, into `self`. Returns whether anything changed.
    ///
    /// The default keeps the mounted value as is, so a parent re-render never
    /// refreshes the component. Any component that takes values from its
    /// parent has to override this, usually with [`sync`] per field.
    fn update_fields(&mut self, next: &dyn Any) -> bool {
        let _ = next;
        false
    }

    fn on_mount(&mut self, _ctx: &mut Context<'_>) {}

    fn on_dismount(&mut self, _ctx: &mut Context<'_>) {}

    fn on_nav(&mut self, _ctx: &mut Context<'_>, _url: &Url) {}

    fn on_resize(&mut self, _ctx: &mut Context<'_>) {}

    /// Called after `update_fields` reported a change.
    fn on_update(&mut self, _ctx: &mut Context<'_>) {}

    fn on_app_update(&mut self, _ctx: &mut Context<'_>) {}
}

/// Assigns `next` to `field` when they differ.
///
/// Building block for [`Component::update_fields`]:
///
/// ```ignore
/// fn update_fields(&mut self, next: &dyn Any) -> bool {
///     let Some(next) = next.downcast_ref::<Self>() else { return false };
///     sync(&mut self.title, &next.title) | sync(&mut self.count, &next.count)
/// }
/// ```
pub fn sync<T: PartialEq + Clone>(field: &mut T, next: &T) -> bool {
    if field == next {
        return false;
    }
    *field = next.clone();
    true
}

pub type Constructor = fn() -> Box<dyn Component>;

/// Component constructors and app-wide action handlers, shared by the whole
/// application.
#[derive(Default)]
pub struct Registry {
    components: HashMap<Tag, Constructor>,
    actions: HashMap<Tag, ActionHandler>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, constructor: Constructor) -> Result<(), RegistryError> {
        if self.components.contains_key(name) {
            return Err(RegistryError::ComponentConflict(name.to_string()));
        }
        self.components.insert(Tag::from(name), constructor);
        Ok(())
    }

    /// Registers `C` under `name`, using its `Default` value as the initial
    /// state.
    pub fn register_default<C: Component + Default>(&mut self, name: &str) -> Result<(), RegistryError> {
        self.register(name, || Box::new(C::default()))
    }

    pub fn create(&self, name: &str) -> Option<Box<dyn Component>> {
        self.components.get(name).map(|constructor| constructor())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.components.contains_key(name)
    }

    /// Registers a handler that lives as long as the application, attached to
    /// the root component when it is loaded.
    pub fn handle<F>(&mut self, action: &str, handler: F) -> Result<(), RegistryError>
    where
        F: Fn(&mut Context<'_>, &Action) + 'static,
    {
        if self.actions.contains_key(action) {
            return Err(RegistryError::ActionConflict(action.to_string()));
        }
        self.actions.insert(Tag::from(action), ActionHandler::new(handler));
        Ok(())
    }

    pub(crate) fn action_handlers(&self) -> impl Iterator<Item = (&str, &ActionHandler)> {
        self.actions.iter().map(|(name, handler)| (name.as_str(), handler))
    }
}

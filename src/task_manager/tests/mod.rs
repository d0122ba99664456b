mod state_management;
mod registry;

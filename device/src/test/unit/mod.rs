mod allocator;
mod buffer;
mod registry;

pub mod swing;

pub use swing::{
    AnnotationContext, HistoryContext, NewSwing, SwingHistoryItem, SwingImages, SwingPosition,
    SwingRecord,
};

//! Strata 渲染图
//!
//! 根据 Pass 声明的资源读写自动推导执行顺序、跨队列同步和 barrier，
//! 调用方不需要手动插入任何同步指令。

pub mod render_graph;

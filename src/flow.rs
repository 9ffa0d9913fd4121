// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! [`Flow`]: the set of processors running for one query fragment

use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use tokio::task::JoinSet;

use crate::context::FlowContext;
use crate::error::Result;
use crate::internal_err;

/// A unit of work in a flow. A processor reads its inputs to the end (or
/// drains them), closes its output and reports nothing else: errors travel
/// downstream through the output.
#[async_trait]
pub trait Processor: Send + 'static {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Runs the processor to completion
    async fn run(self: Box<Self>);
}

/// Runs processors as tokio tasks and waits for all of them.
///
/// Every spawned processor adds exactly one task to the flow's
/// [`JoinSet`], so [`Flow::wait`] returns only once each of them has
/// finished, whatever the outcome. Dropping the flow aborts the tasks
/// still running.
pub struct Flow {
    ctx: Arc<FlowContext>,
    join_set: JoinSet<()>,
}

impl Flow {
    pub fn new(ctx: Arc<FlowContext>) -> Self {
        Self {
            ctx,
            join_set: JoinSet::new(),
        }
    }

    pub fn context(&self) -> &Arc<FlowContext> {
        &self.ctx
    }

    /// Number of processors that have not finished yet
    pub fn len(&self) -> usize {
        self.join_set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.join_set.is_empty()
    }

    /// Starts `processor` on the current runtime
    pub fn spawn(&mut self, processor: Box<dyn Processor>) {
        debug!("spawning processor {}", processor.name());
        self.join_set.spawn(processor.run());
    }

    /// Cancels every processor of the flow
    pub fn cancel(&self) {
        self.ctx.cancel()
    }

    /// Waits for every processor to finish. A panic in a processor is
    /// resumed on the caller.
    pub async fn wait(mut self) -> Result<()> {
        while let Some(result) = self.join_set.join_next().await {
            if let Err(e) = result {
                if e.is_panic() {
                    std::panic::resume_unwind(e.into_panic());
                }
                return internal_err!("Non Panic Task error: {e}");
            }
        }
        Ok(())
    }
}

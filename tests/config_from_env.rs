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

use flowsort::config::{
    ExecutionOptions, DEFAULT_WORK_MEM, OPT_CHANNEL_CAPACITY, OPT_SPILL_BATCH_SIZE,
    OPT_USE_TEMP_STORAGE, OPT_WORK_MEM,
};
use std::env;

#[test]
fn get_config_bool_from_env() {
    let env_key = OPT_USE_TEMP_STORAGE;
    env::set_var(env_key, "false");
    let config = ExecutionOptions::from_env();
    env::remove_var(env_key);
    assert!(!config.use_temp_storage);
}

#[test]
fn get_config_int_from_env() {
    let env_key = OPT_WORK_MEM;
    env::set_var(env_key, "1048576");
    let config = ExecutionOptions::from_env();
    env::remove_var(env_key);
    assert_eq!(config.work_mem, 1024 * 1024);
}

#[test]
fn get_config_int_from_env_invalid() {
    let env_key = OPT_SPILL_BATCH_SIZE;
    env::set_var(env_key, "abc");
    let config = ExecutionOptions::from_env();
    env::remove_var(env_key);
    assert_eq!(config.spill_batch_size, 8192); // set to its default value
}

#[test]
fn get_config_size_from_env_is_clamped() {
    let env_key = OPT_CHANNEL_CAPACITY;
    env::set_var(env_key, "0");
    let config = ExecutionOptions::from_env();
    env::remove_var(env_key);
    assert_eq!(config.channel_capacity, 1);
}

#[test]
fn default_work_mem() {
    assert_eq!(ExecutionOptions::default().work_mem, DEFAULT_WORK_MEM);
}

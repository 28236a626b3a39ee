mod compaction_tests;
mod depth_tests;
mod dispatcher_tests;
mod oms_tests;
mod poller_tests;
mod sequence_tests;

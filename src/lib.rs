pub mod core;
pub mod storage;
pub mod schema;
pub mod content;
pub mod index;
pub mod search;
pub mod query;
pub mod mvcc;
pub mod writer;

/*
┌────────────────────────────────────────────────────────────────────────────────────┐
│                          CMIS SEARCH STRUCT ARCHITECTURE                           │
└────────────────────────────────────────────────────────────────────────────────────┘

┌──────────────────────────────────── CORE LAYER ────────────────────────────────────┐
│  ┌──────────────────────────────────────────────────────────────────────────────┐  │
│  │                           struct SearchDatabase                              │  │
│  │ config: Config                      // storage path, marker, merge policy    │  │
│  │ schema: Arc<Schema>                 // CMIS type definitions                 │  │
│  │ index: Arc<IndexManager>            // single writer, segments, merges       │  │
│  │ engine: QueryEngine                 // plan -> optimize -> execute           │  │
│  │ recovery: Arc<RecoveryManager>      // marker file + full reindex            │  │
│  └──────────────────────────────────────────────────────────────────────────────┘  │
│  ┌──────────────────┐  ┌──────────────────────┐  ┌──────────────────────────────┐  │
│  │ struct Document  │  │ struct IndexTrans-   │  │ enum Value                   │  │
│  │ • id: ContentId  │  │   action             │  │ • String / Id / Integer      │  │
│  │ • type_name      │  │ • added   BTreeSet   │  │ • Double / Boolean / Date    │  │
│  │ • parent_id      │  │ • updated BTreeSet   │  └──────────────────────────────┘  │
│  │ • properties     │  │ • removed BTreeSet   │                                    │
│  │ • text           │  └──────────────────────┘                                    │
│  └──────────────────┘                                                              │
└────────────────────────────────────────────────────────────────────────────────────┘

┌──────────────────────────────────── QUERY LAYER ───────────────────────────────────┐
│  Query (AQM) ──► QueryValidator ──► QueryPlanner ──► QueryOptimizer ──► Processor  │
│                                                                                    │
│  ┌─────────────────────┐  ┌──────────────────────┐  ┌───────────────────────────┐  │
│  │ enum Source         │  │ enum PlanNode        │  │ trait OptimizationRule    │  │
│  │ • Selector          │  │ • Source / Select    │  │ • SelectMergeRule         │  │
│  │ • Join              │  │ • Join / Sort        │  │ • JoinReorderRule         │  │
│  └─────────────────────┘  │ • Limit              │  └───────────────────────────┘  │
│  ┌─────────────────────┐  └──────────────────────┘                                 │
│  │ enum Constraint     │                                                           │
│  │ • And / Or / Not    │  ┌──────────────────────┐                                 │
│  │ • Comparison        │  │ QueryExecution-      │                                 │
│  │ • FullText          │  │   Context            │                                 │
│  │ • Child/Descendant  │  │ • schema             │                                 │
│  │ • InFolder / InTree │  │ • bind_variables     │                                 │
│  └─────────────────────┘  │ • exceptions         │                                 │
│                           └──────────────────────┘                                 │
└────────────────────────────────────────────────────────────────────────────────────┘

┌──────────────────────────────────── INDEX LAYER ───────────────────────────────────┐
│  ┌─────────────────────┐  ┌──────────────────────┐  ┌───────────────────────────┐  │
│  │ struct Searcher     │  │ enum NativeQuery     │  │ trait DocumentMatcher     │  │
│  │ • snapshot          │  │ • Term / Range       │  │ • OperandMatcher          │  │
│  │ • live: Roaring     │  │ • Bool / Regex       │  └───────────────────────────┘  │
│  │ • id -> address     │  │ • Children           │  ┌───────────────────────────┐  │
│  └─────────────────────┘  │ • Descendants        │  │ CaseInsensitiveQuery      │  │
│                           │ • CaseInsensitive    │  │ • fold: Upper / Lower     │  │
│  DescendantTraversal      └──────────────────────┘  │ • condition: owned bounds │  │
│  • generation by generation, visited bitmap         └───────────────────────────┘  │
└────────────────────────────────────────────────────────────────────────────────────┘

┌─────────────────────────────────── STORAGE LAYER ──────────────────────────────────┐
│  ┌─────────────────────┐  ┌──────────────────────┐  ┌───────────────────────────┐  │
│  │ struct Segment      │  │ struct Manifest      │  │ trait MergePolicy         │  │
│  │ • id: SegmentId     │  │ • generation         │  │ • DocumentCount           │  │
│  │ • documents         │  │ • segments + deletes │  │ • DirectorySize / IdleTime│  │
│  │ • postings          │  └──────────────────────┘  │ • MaxSegment/DocCount     │  │
│  └─────────────────────┘  ┌──────────────────────┐  └───────────────────────────┘  │
│  ┌─────────────────────┐  │ struct ReindexMarker │  ┌───────────────────────────┐  │
│  │ struct FileLock     │  │ • path               │  │ struct MVCCController     │  │
│  └─────────────────────┘  └──────────────────────┘  │ • current: Arc<Snapshot>  │  │
│                                                     └───────────────────────────┘  │
└────────────────────────────────────────────────────────────────────────────────────┘
*/
